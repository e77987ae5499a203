//! Sequential execution engine
//!
//! Drives one run end to end: parse inputs, execute local prerequisites,
//! then fan every remote command out across every target in list order.
//! Local failures abort the run; remote failures are logged with host and
//! command context and the run continues. Nothing executes in parallel:
//! one (target, command) pair at a time.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use fanout_exec::local::LocalExecutor;
use fanout_exec::runner::RemoteRunner;

use crate::addr::{AddressClass, classify};
use crate::config::RunConfig;
use crate::error::EngineError;
use crate::input::{CommandSpec, NodeList};
use crate::naming::{result_dir_name, result_file_name};

/// Counts reported at the end of a run
///
/// A run with `failed > 0` still exits cleanly; best effort means one
/// unreachable target never blocks reporting from the rest.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Targets in the node list
    pub targets: usize,
    /// Remote executions attempted
    pub attempted: usize,
    /// Remote executions that failed (either leg, for relayed runs)
    pub failed: usize,
}

/// One run over nodes × commands
pub struct Engine {
    config: RunConfig,
    local: LocalExecutor,
    runner: Arc<dyn RemoteRunner>,
}

impl Engine {
    /// Build an engine from its configuration and a remote runner
    pub fn new(config: RunConfig, runner: Arc<dyn RemoteRunner>) -> Self {
        Self {
            config,
            local: LocalExecutor::new(),
            runner,
        }
    }

    /// Execute the run: parse inputs, local phase, remote phase
    ///
    /// # Errors
    /// Only the fatal classes: unreadable inputs, malformed command entries,
    /// failed local commands, unpersistable result directories
    pub async fn run(&self) -> Result<RunSummary, EngineError> {
        let nodes = NodeList::load(&self.config.nodes_path).await?;
        info!(count = nodes.len(), "got target node(s)");

        let commands = CommandSpec::load(&self.config.cmds_path).await?;

        self.local_phase(commands.local()).await?;
        self.remote_phase(&nodes, commands.remote()).await
    }

    /// Local prerequisites; any failure aborts the run
    async fn local_phase(&self, commands: &[String]) -> Result<(), EngineError> {
        info!(count = commands.len(), "executing local command(s)");

        for command in commands {
            let result =
                self.local
                    .run(command)
                    .await
                    .map_err(|e| EngineError::LocalExec {
                        command: command.clone(),
                        detail: e.to_string(),
                    })?;
            print!("{}", result.combined_output());
            if !result.success() {
                return Err(EngineError::LocalExec {
                    command: command.clone(),
                    detail: format!("exit status {}", result.status),
                });
            }
        }
        Ok(())
    }

    /// Remote fan-out; per-command failures are logged and counted only
    async fn remote_phase(
        &self,
        nodes: &NodeList,
        commands: &[String],
    ) -> Result<RunSummary, EngineError> {
        info!(count = commands.len(), "executing remote command(s)");

        let mut summary = RunSummary {
            targets: nodes.len(),
            ..RunSummary::default()
        };

        for node in nodes.nodes() {
            let Some(class) = classify(node) else {
                warn!(target = %node, "skipping target, not a valid IPv4 address");
                continue;
            };

            let dir = self.ensure_result_dir(node).await?;
            let relayed = class == AddressClass::Private && self.config.bastion.is_some();
            if class == AddressClass::Private {
                info!(target = %node, relayed = relayed, "target is in the private address space");
            }

            for command in commands {
                summary.attempted += 1;
                let result_path = dir.join(result_file_name(command));

                if relayed {
                    let outcome = self.runner.run_relayed(node, command, &result_path).await;
                    if let Err(e) = &outcome.target {
                        error!(target = %node, command = %command, error = %e, "target leg failed");
                    }
                    if let Err(e) = &outcome.bastion {
                        error!(target = %node, command = %command, error = %e, "bastion leg failed");
                    }
                    if !outcome.fully_succeeded() {
                        summary.failed += 1;
                    }
                } else {
                    info!(user = %self.config.user, target = %node, command = %command, "executing on target");
                    if let Err(e) = self.runner.run_direct(node, command, &result_path).await {
                        error!(target = %node, command = %command, error = %e, "remote command failed");
                        summary.failed += 1;
                    }
                }
            }
        }

        info!(
            targets = summary.targets,
            attempted = summary.attempted,
            failed = summary.failed,
            "run complete"
        );
        Ok(summary)
    }

    /// Create the target's result directory if absent; idempotent
    async fn ensure_result_dir(&self, node: &str) -> Result<PathBuf, EngineError> {
        let dir = self.config.results_root.join(result_dir_name(node));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| EngineError::ResultDir {
                path: dir.display().to_string(),
                source,
            })?;
        Ok(dir)
    }
}
