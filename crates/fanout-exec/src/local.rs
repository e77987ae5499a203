//! Local command execution using `tokio::process`
//!
//! Drives the local phase of a run: commands executed on the controlling
//! host before any remote work starts.

use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::result::CommandResult;

/// Local command executor
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Execute `cmd` to completion, capturing combined output
    ///
    /// # Errors
    /// `SpawnError` if the process cannot start, `IoError` if waiting on it
    /// fails. A non-zero exit status is not an error here; the caller decides
    /// whether that is fatal.
    #[instrument(skip(self), level = "debug")]
    pub async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, "executing local command");

        // Use shell to support pipes, redirections, etc.
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "command completed"
        );

        if !output.status.success() {
            error!(
                command = %cmd,
                status = status,
                stderr = %stderr,
                "command failed"
            );
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    /// Execute `cmd` with an upper bound on its runtime
    ///
    /// # Errors
    /// As [`run`](Self::run), plus `Timeout` when the bound is exceeded
    #[instrument(skip(self), level = "debug")]
    pub async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let result = timeout(timeout_duration, self.run(cmd)).await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    "local command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }
}
