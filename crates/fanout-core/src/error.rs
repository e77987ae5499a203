//! Error types for fanout-core
//!
//! Only the fatal classes live here: unreadable inputs, malformed command
//! entries, failed local prerequisites and unpersistable results. Remote
//! failures are logged and counted, never raised.

use thiserror::Error;

/// Fatal run errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Node-list file unreadable
    #[error("cannot read node list {path}: {source}")]
    NodesRead {
        path: String,
        source: std::io::Error,
    },

    /// Command-list file unreadable
    #[error("cannot read command list {path}: {source}")]
    CommandsRead {
        path: String,
        source: std::io::Error,
    },

    /// Command entry without a `SCOPE:command` separator
    #[error("malformed command entry at line {line}: missing ':' separator")]
    MalformedCommand { line: usize },

    /// Local prerequisite command failed
    #[error("local command {command:?} failed: {detail}")]
    LocalExec { command: String, detail: String },

    /// Result directory could not be created
    #[error("cannot create result directory {path}: {source}")]
    ResultDir {
        path: String,
        source: std::io::Error,
    },
}
