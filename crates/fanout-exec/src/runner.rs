//! Remote runner seam
//!
//! [`RemoteRunner`] is the boundary the execution engine dispatches through;
//! [`SshRunner`] is the real implementation, opening a fresh session per
//! command. Engine tests substitute mock runners behind the trait.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::keys::{KeyError, KeySource, ResolvedKey};
use crate::relay::{self, RelayOutcome};
use crate::result::Endpoint;
use crate::ssh::SshSession;

#[async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Run `command` on `host` directly, stdout persisted to `result_path`
    async fn run_direct(
        &self,
        host: &str,
        command: &str,
        result_path: &Path,
    ) -> Result<(), ExecError>;

    /// Run `command` on the private `host` and relay through the bastion,
    /// stdout of the bastion leg persisted to `result_path`
    async fn run_relayed(&self, host: &str, command: &str, result_path: &Path) -> RelayOutcome;
}

/// SSH-backed runner
///
/// Holds the run-global pieces every session needs: user, the once-resolved
/// key, timeouts and the optional bastion endpoint. Each call dials its own
/// connection; no session outlives its command.
pub struct SshRunner {
    user: String,
    // A key that failed to resolve fails each connect attempt, not the run
    key: Result<ResolvedKey, KeyError>,
    agent_fallback: bool,
    bastion: Option<Endpoint>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl SshRunner {
    /// Start building a runner for `user`
    pub fn builder(user: impl Into<String>) -> SshRunnerBuilder {
        SshRunnerBuilder {
            user: user.into(),
            key_source: KeySource::Agent,
            agent_fallback: false,
            bastion: None,
            connect_timeout: Duration::from_secs(5),
            command_timeout: Some(Duration::from_secs(300)),
        }
    }

    pub(crate) fn bastion(&self) -> Option<&Endpoint> {
        self.bastion.as_ref()
    }

    pub(crate) fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    pub(crate) async fn open_session(&self, endpoint: &Endpoint) -> Result<SshSession, ExecError> {
        let key = self
            .key
            .as_ref()
            .map_err(|e| ExecError::KeyError(e.to_string()))?;
        SshSession::connect(
            endpoint,
            &self.user,
            key,
            self.agent_fallback,
            self.connect_timeout,
        )
        .await
    }
}

#[async_trait]
impl RemoteRunner for SshRunner {
    async fn run_direct(
        &self,
        host: &str,
        command: &str,
        result_path: &Path,
    ) -> Result<(), ExecError> {
        let session = self.open_session(&Endpoint::new(host)).await?;
        session
            .run_to_file(command, result_path, self.command_timeout)
            .await
    }

    async fn run_relayed(&self, host: &str, command: &str, result_path: &Path) -> RelayOutcome {
        relay::run_relayed(self, host, command, result_path).await
    }
}

/// Builder for `SshRunner`
pub struct SshRunnerBuilder {
    user: String,
    key_source: KeySource,
    agent_fallback: bool,
    bastion: Option<Endpoint>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl SshRunnerBuilder {
    /// Set SSH key path
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.key_source = KeySource::Path(path.into());
        self
    }

    /// Set key from environment variable (base64)
    #[must_use]
    pub fn with_env_key(mut self, var_name: impl Into<String>) -> Self {
        self.key_source = KeySource::Env(var_name.into());
        self
    }

    /// Use SSH agent as the sole authentication method
    #[must_use]
    pub fn with_agent(mut self) -> Self {
        self.key_source = KeySource::Agent;
        self
    }

    /// Set the key source directly
    #[must_use]
    pub fn with_key_source(mut self, source: KeySource) -> Self {
        self.key_source = source;
        self
    }

    /// Fall back to the SSH agent when key authentication is unusable
    #[must_use]
    pub fn with_agent_fallback(mut self, enabled: bool) -> Self {
        self.agent_fallback = enabled;
        self
    }

    /// Relay commands for private targets through this bastion
    #[must_use]
    pub fn with_bastion(mut self, bastion: Endpoint) -> Self {
        self.bastion = Some(bastion);
        self
    }

    /// Bound on dial latency
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound on a single command, `None` for unbounded
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Build the runner, resolving the key once for the whole run
    #[must_use]
    pub fn build(self) -> SshRunner {
        let key = match self.key_source.resolve() {
            Ok(key) => Ok(key),
            Err(e) if self.agent_fallback => {
                tracing::warn!(error = %e, "key unusable, falling back to agent");
                Ok(ResolvedKey::Agent)
            }
            Err(e) => Err(e),
        };

        SshRunner {
            user: self.user,
            key,
            agent_fallback: self.agent_fallback,
            bastion: self.bastion,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_key_defers_failure_to_connect_time() {
        let runner = SshRunner::builder("core")
            .with_key_path("/nonexistent/key")
            .build();
        assert!(runner.key.is_err());
    }

    #[test]
    fn agent_fallback_masks_bad_key() {
        let runner = SshRunner::builder("core")
            .with_key_path("/nonexistent/key")
            .with_agent_fallback(true)
            .build();
        assert!(matches!(runner.key, Ok(ResolvedKey::Agent)));
    }

    #[test]
    fn agent_source_resolves_without_key_material() {
        let runner = SshRunner::builder("core").with_agent().build();
        assert!(matches!(runner.key, Ok(ResolvedKey::Agent)));
    }

    #[test]
    fn env_key_from_unset_variable_defers_failure() {
        let runner = SshRunner::builder("core")
            .with_env_key("FANOUT_RUNNER_KEY_UNSET")
            .build();
        assert!(runner.key.is_err());
    }
}
