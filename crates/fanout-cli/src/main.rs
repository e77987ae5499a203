//! fanout CLI
//!
//! Fans a list of shell commands out across a list of remote hosts over SSH,
//! optionally relaying privately addressed targets through a bastion host,
//! and persists each command's output to per-host result files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use color_eyre::Result;
use tracing::{error, info};

use fanout_core::{Engine, EngineError, RunConfig};
use fanout_exec::keys::KeySource;
use fanout_exec::result::Endpoint;
use fanout_exec::runner::SshRunner;

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(version, about = "Run shell commands across remote hosts over SSH", long_about = None)]
#[command(group(ArgGroup::new("key").required(true).args(["private_key", "key_env"])))]
struct Cli {
    /// User name for the SSH connection
    #[arg(short = 'u', long)]
    user: String,

    /// Path to the private key used for SSH authentication
    #[arg(long = "pk", value_name = "PATH")]
    private_key: Option<PathBuf>,

    /// Environment variable holding the private key (base64)
    #[arg(long = "pk-env", value_name = "VAR")]
    key_env: Option<String>,

    /// File listing the target nodes, one per line
    #[arg(long = "nl", value_name = "PATH")]
    nodes: PathBuf,

    /// File listing the commands, one SCOPE:command entry per line
    #[arg(long = "cmds", value_name = "PATH")]
    commands: PathBuf,

    /// Relay commands for private addresses through this bastion host
    #[arg(long, value_name = "HOST[:PORT]")]
    bastion: Option<Endpoint>,

    /// Fall back to the SSH agent when key authentication is unusable
    #[arg(long)]
    agent: bool,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    connect_timeout: u64,

    /// Per-command timeout in seconds, 0 to disable
    #[arg(long, default_value_t = 300, value_name = "SECS")]
    command_timeout: u64,
}

// Exit statuses: 1 node-list read, 2 command-list read/parse, 3 local
// command, 4 usage, 5 result directory
fn exit_code(err: &EngineError) -> u8 {
    match err {
        EngineError::NodesRead { .. } => 1,
        EngineError::CommandsRead { .. } | EngineError::MalformedCommand { .. } => 2,
        EngineError::LocalExec { .. } => 3,
        EngineError::ResultDir { .. } => 5,
    }
}

// Help and version requests surface as parse errors but are not failures
fn usage_status(err: &clap::Error) -> u8 {
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
        _ => 4,
    }
}

fn build_config(cli: Cli) -> RunConfig {
    let key = match (cli.private_key, cli.key_env) {
        (Some(path), _) => KeySource::Path(path),
        (None, Some(var)) => KeySource::Env(var),
        // The arg group guarantees one of the two is present
        (None, None) => unreachable!("clap enforces a key source"),
    };

    let command_timeout = match cli.command_timeout {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let mut config = RunConfig::new(cli.user, key, cli.nodes, cli.commands)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout))
        .with_command_timeout(command_timeout);
    if let Some(bastion) = cli.bastion {
        config = config.with_bastion(bastion);
    }
    if cli.agent {
        config = config.with_agent_fallback();
    }
    config
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return Ok(ExitCode::from(usage_status(&e)));
        }
    };

    let config = build_config(cli);

    let mut builder = SshRunner::builder(&config.user)
        .with_key_source(config.key.clone())
        .with_agent_fallback(config.agent_fallback)
        .with_connect_timeout(config.connect_timeout)
        .with_command_timeout(config.command_timeout);
    if let Some(bastion) = &config.bastion {
        builder = builder.with_bastion(bastion.clone());
    }
    let runner = Arc::new(builder.build());

    let engine = Engine::new(config, runner);

    match engine.run().await {
        Ok(summary) => {
            info!(
                targets = summary.targets,
                attempted = summary.attempted,
                failed = summary.failed,
                "done"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{e}");
            Ok(ExitCode::from(exit_code(&e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_flags_enforced() {
        let err = Cli::try_parse_from(["fanout", "-u", "core"]).unwrap_err();
        assert_eq!(usage_status(&err), 4);
    }

    #[test]
    fn help_and_version_exit_cleanly() {
        let err = Cli::try_parse_from(["fanout", "--help"]).unwrap_err();
        assert_eq!(usage_status(&err), 0);

        let err = Cli::try_parse_from(["fanout", "--version"]).unwrap_err();
        assert_eq!(usage_status(&err), 0);
    }

    #[test]
    fn minimal_invocation_parses() {
        let cli = Cli::try_parse_from([
            "fanout", "-u", "core", "--pk", "/tmp/key", "--nl", "nodes", "--cmds", "cmds",
        ])
        .unwrap();
        assert_eq!(cli.user, "core");
        assert_eq!(cli.connect_timeout, 5);
        assert!(cli.bastion.is_none());
    }

    #[test]
    fn bastion_flag_parses_endpoint() {
        let cli = Cli::try_parse_from([
            "fanout", "-u", "core", "--pk", "/tmp/key", "--nl", "nodes", "--cmds", "cmds",
            "--bastion", "203.0.113.10:2222",
        ])
        .unwrap();
        let bastion = cli.bastion.unwrap();
        assert_eq!(bastion.host, "203.0.113.10");
        assert_eq!(bastion.port, 2222);
    }

    #[test]
    fn zero_disables_command_timeout() {
        let cli = Cli::try_parse_from([
            "fanout", "-u", "core", "--pk", "/tmp/key", "--nl", "nodes", "--cmds", "cmds",
            "--command-timeout", "0",
        ])
        .unwrap();
        let config = build_config(cli);
        assert!(config.command_timeout.is_none());
    }
}
