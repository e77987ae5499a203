//! Relayed execution through a bastion host
//!
//! Privately addressed targets are reached in two legs chained through an
//! in-memory relay buffer. The target leg captures the command's output into
//! the buffer; once the capture is complete (writer closed, EOF defined) the
//! bastion leg runs the same command with that capture on its standard input
//! and its own stdout streamed to the result file. The legs fail
//! independently: a failed target leg is logged and the bastion leg still
//! runs, fed whatever capture was gathered before the failure (empty if the
//! target leg never produced output).

use std::path::Path;

use tracing::{info, warn};

use crate::error::ExecError;
use crate::result::Endpoint;
use crate::runner::SshRunner;

/// Per-leg results of one relayed execution
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    /// Target-leg result (command on the private host)
    pub target: Result<(), ExecError>,
    /// Bastion-leg result (command on the bastion, capture on stdin)
    pub bastion: Result<(), ExecError>,
}

impl RelayOutcome {
    /// Both legs completed cleanly
    #[must_use]
    pub fn fully_succeeded(&self) -> bool {
        self.target.is_ok() && self.bastion.is_ok()
    }

    fn failed(error: ExecError) -> Self {
        Self {
            target: Err(error.clone()),
            bastion: Err(error),
        }
    }
}

pub(crate) async fn run_relayed(
    runner: &SshRunner,
    host: &str,
    command: &str,
    result_path: &Path,
) -> RelayOutcome {
    let Some(bastion) = runner.bastion() else {
        return RelayOutcome::failed(ExecError::ConnectionFailed(
            "no bastion host configured".to_string(),
        ));
    };

    info!(target = %host, bastion = %bastion, command = %command, "relaying through bastion");

    let mut relay_buf = Vec::new();
    let target = run_target_leg(runner, host, command, &mut relay_buf).await;
    if let Err(e) = &target {
        warn!(target = %host, command = %command, error = %e, "target leg failed, relaying the capture gathered so far");
    }

    let bastion = run_bastion_leg(runner, bastion, command, &relay_buf, result_path).await;

    RelayOutcome { target, bastion }
}

async fn run_target_leg(
    runner: &SshRunner,
    host: &str,
    command: &str,
    relay_buf: &mut Vec<u8>,
) -> Result<(), ExecError> {
    let session = runner.open_session(&Endpoint::new(host)).await?;
    session
        .run_to_sink(command, relay_buf, runner.command_timeout())
        .await
}

async fn run_bastion_leg(
    runner: &SshRunner,
    bastion: &Endpoint,
    command: &str,
    relay_buf: &[u8],
    result_path: &Path,
) -> Result<(), ExecError> {
    let session = runner.open_session(bastion).await?;
    session
        .run_with_stdin_to_file(command, relay_buf, result_path, runner.command_timeout())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_requires_both_legs() {
        let ok = RelayOutcome {
            target: Ok(()),
            bastion: Ok(()),
        };
        assert!(ok.fully_succeeded());

        let half = RelayOutcome {
            target: Err(ExecError::ConnectionFailed("unreachable".to_string())),
            bastion: Ok(()),
        };
        assert!(!half.fully_succeeded());
    }

    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_relayed_run() {
        // Needs a reachable bastion and target; exercised manually
    }
}
