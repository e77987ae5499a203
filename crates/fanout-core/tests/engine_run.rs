use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fanout_core::{Engine, EngineError, RunConfig};
use fanout_exec::error::ExecError;
use fanout_exec::keys::KeySource;
use fanout_exec::relay::RelayOutcome;
use fanout_exec::result::Endpoint;
use fanout_exec::runner::RemoteRunner;

// Mock runner recording the dispatch order
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Direct(String, String),
    Relayed(String, String),
}

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<Call>>,
    fail_hosts: Vec<String>,
}

impl RecordingRunner {
    fn failing_on(hosts: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_hosts: hosts.iter().map(ToString::to_string).collect(),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteRunner for RecordingRunner {
    async fn run_direct(
        &self,
        host: &str,
        command: &str,
        result_path: &Path,
    ) -> Result<(), ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Direct(host.to_string(), command.to_string()));
        if self.fail_hosts.iter().any(|h| h == host) {
            return Err(ExecError::ConnectionFailed("unreachable".to_string()));
        }
        std::fs::write(result_path, b"captured\n").unwrap();
        Ok(())
    }

    async fn run_relayed(&self, host: &str, command: &str, result_path: &Path) -> RelayOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Relayed(host.to_string(), command.to_string()));
        if self.fail_hosts.iter().any(|h| h == host) {
            return RelayOutcome {
                target: Err(ExecError::ConnectionFailed("unreachable".to_string())),
                bastion: Ok(()),
            };
        }
        std::fs::write(result_path, b"relayed\n").unwrap();
        RelayOutcome {
            target: Ok(()),
            bastion: Ok(()),
        }
    }
}

// Per-test scratch directory under the system temp dir
struct Scratch {
    root: PathBuf,
}

impl Scratch {
    fn new(name: &str) -> Self {
        let root =
            std::env::temp_dir().join(format!("fanout_engine_{}_{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn results(&self) -> PathBuf {
        self.root.join("results")
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn config(scratch: &Scratch, nodes: &str, cmds: &str) -> RunConfig {
    let nodes_path = scratch.write("nodes", nodes);
    let cmds_path = scratch.write("cmds", cmds);
    RunConfig::new("core", KeySource::Agent, nodes_path, cmds_path)
        .with_results_root(scratch.results())
}

#[tokio::test]
async fn fan_out_covers_every_target_and_command_in_order() {
    let scratch = Scratch::new("fan_out");
    let cfg = config(
        &scratch,
        "# comment line\n8.8.8.8\n9.9.9.9\n",
        "LOCAL:echo hi\nREMOTE:uptime\nREMOTE:df -h /\n",
    );
    let runner = Arc::new(RecordingRunner::default());
    let engine = Engine::new(cfg, runner.clone());

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.targets, 2);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        runner.calls(),
        vec![
            Call::Direct("8.8.8.8".to_string(), "uptime".to_string()),
            Call::Direct("8.8.8.8".to_string(), "df -h /".to_string()),
            Call::Direct("9.9.9.9".to_string(), "uptime".to_string()),
            Call::Direct("9.9.9.9".to_string(), "df -h /".to_string()),
        ]
    );
    assert!(scratch.results().join("8_8_8_8").join("uptime").is_file());
    assert!(scratch.results().join("9_9_9_9").join("df_-h_-").is_file());
}

#[tokio::test]
async fn failure_on_one_target_does_not_stop_the_next() {
    let scratch = Scratch::new("continue");
    let cfg = config(&scratch, "8.8.8.8\n9.9.9.9\n", "REMOTE:uptime\n");
    let runner = Arc::new(RecordingRunner::failing_on(&["8.8.8.8"]));
    let engine = Engine::new(cfg, runner.clone());

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn private_targets_relayed_when_bastion_configured() {
    let scratch = Scratch::new("relay");
    let cfg = config(&scratch, "10.0.0.5\n8.8.8.8\n", "REMOTE:uptime\n")
        .with_bastion(Endpoint::new("203.0.113.10"));
    let runner = Arc::new(RecordingRunner::default());
    let engine = Engine::new(cfg, runner.clone());

    engine.run().await.unwrap();

    assert_eq!(
        runner.calls(),
        vec![
            Call::Relayed("10.0.0.5".to_string(), "uptime".to_string()),
            Call::Direct("8.8.8.8".to_string(), "uptime".to_string()),
        ]
    );
}

#[tokio::test]
async fn private_targets_run_direct_without_bastion() {
    let scratch = Scratch::new("no_bastion");
    let cfg = config(&scratch, "10.0.0.5\n", "REMOTE:uptime\n");
    let runner = Arc::new(RecordingRunner::default());
    let engine = Engine::new(cfg, runner.clone());

    engine.run().await.unwrap();

    assert_eq!(
        runner.calls(),
        vec![Call::Direct("10.0.0.5".to_string(), "uptime".to_string())]
    );
}

#[tokio::test]
async fn relay_leg_failure_counts_but_does_not_abort() {
    let scratch = Scratch::new("relay_fail");
    let cfg = config(&scratch, "10.0.0.5\n8.8.8.8\n", "REMOTE:uptime\n")
        .with_bastion(Endpoint::new("203.0.113.10"));
    let runner = Arc::new(RecordingRunner::failing_on(&["10.0.0.5"]));
    let engine = Engine::new(cfg, runner.clone());

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn unparsable_target_skipped_with_no_dispatch() {
    let scratch = Scratch::new("skip");
    let cfg = config(&scratch, "not-an-ip\n8.8.8.8\n", "REMOTE:uptime\n");
    let runner = Arc::new(RecordingRunner::default());
    let engine = Engine::new(cfg, runner.clone());

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.targets, 2);
    assert_eq!(summary.attempted, 1);
    assert_eq!(
        runner.calls(),
        vec![Call::Direct("8.8.8.8".to_string(), "uptime".to_string())]
    );
}

#[tokio::test]
async fn local_failure_aborts_before_any_remote_dispatch() {
    let scratch = Scratch::new("local_fatal");
    let cfg = config(&scratch, "8.8.8.8\n", "LOCAL:exit 7\nREMOTE:uptime\n");
    let runner = Arc::new(RecordingRunner::default());
    let engine = Engine::new(cfg, runner.clone());

    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, EngineError::LocalExec { .. }));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn result_dir_created_once_across_commands() {
    let scratch = Scratch::new("dir_once");
    let cfg = config(&scratch, "10.0.0.5\n", "REMOTE:uptime\nREMOTE:date\n");
    let runner = Arc::new(RecordingRunner::default());
    let engine = Engine::new(cfg, runner.clone());

    engine.run().await.unwrap();

    let dir = scratch.results().join("10_0_0_5");
    assert!(dir.is_dir());
    assert!(dir.join("uptime").is_file());
    assert!(dir.join("date").is_file());
}

#[tokio::test]
async fn missing_node_list_is_fatal() {
    let scratch = Scratch::new("missing_nodes");
    let cmds_path = scratch.write("cmds", "REMOTE:uptime\n");
    let cfg = RunConfig::new(
        "core",
        KeySource::Agent,
        scratch.root.join("absent"),
        cmds_path,
    )
    .with_results_root(scratch.results());
    let engine = Engine::new(cfg, Arc::new(RecordingRunner::default()));

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EngineError::NodesRead { .. }));
}
