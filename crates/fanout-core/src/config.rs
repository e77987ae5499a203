//! Run configuration
//!
//! One immutable value handed to the engine at construction; nothing here is
//! mutated once a run starts. The capability set falls out of the fields:
//! a bastion endpoint enables relayed execution, `agent_fallback` enables
//! agent authentication next to the key.

use std::path::PathBuf;
use std::time::Duration;

use fanout_exec::keys::KeySource;
use fanout_exec::result::Endpoint;

/// Configuration for a single run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Identity used for SSH authentication
    pub user: String,
    /// Credential source
    pub key: KeySource,
    /// Node-list file
    pub nodes_path: PathBuf,
    /// Command-list file
    pub cmds_path: PathBuf,
    /// Bound on dial latency
    pub connect_timeout: Duration,
    /// Bound on a single remote command, `None` for unbounded
    pub command_timeout: Option<Duration>,
    /// Relay commands for private targets through this host
    pub bastion: Option<Endpoint>,
    /// Fall back to the SSH agent when key authentication is unusable
    pub agent_fallback: bool,
    /// Directory under which per-target result directories are created
    pub results_root: PathBuf,
}

impl RunConfig {
    /// Create a configuration with default timeouts and no bastion
    pub fn new(
        user: impl Into<String>,
        key: KeySource,
        nodes_path: impl Into<PathBuf>,
        cmds_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            user: user.into(),
            key,
            nodes_path: nodes_path.into(),
            cmds_path: cmds_path.into(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Some(Duration::from_secs(300)),
            bastion: None,
            agent_fallback: false,
            results_root: PathBuf::from("."),
        }
    }

    /// Enable relayed execution through `bastion`
    #[must_use]
    pub fn with_bastion(mut self, bastion: Endpoint) -> Self {
        self.bastion = Some(bastion);
        self
    }

    /// Enable agent-auth fallback
    #[must_use]
    pub fn with_agent_fallback(mut self) -> Self {
        self.agent_fallback = true;
        self
    }

    /// Set the dial timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-command bound, `None` for unbounded
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Place result directories under `root` instead of the working directory
    #[must_use]
    pub fn with_results_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.results_root = root.into();
        self
    }
}
