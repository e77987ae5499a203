//! Error types for fanout-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during command execution
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt exceeded the dial timeout
    #[error("connection to {host} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Host that did not answer in time
        host: String,
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// SSH key error
    #[error("SSH key error: {0}")]
    KeyError(String),

    /// Failed to open or drive the command channel
    #[error("channel failed: {0}")]
    ChannelFailed(String),

    /// Remote command finished with a non-zero status
    #[error("command failed with status {status}: {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Check if the error is of the transient class (unreachable host,
    /// exceeded timeout) as opposed to a configuration or protocol fault
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::ConnectTimeout { .. }
                | ExecError::Timeout { .. }
        )
    }
}
