//! SSH session adapter using the russh crate
//!
//! A [`SshSession`] binds exactly one authenticated connection to exactly one
//! command: it is connected, used for a single run and torn down. Sessions
//! are never reused across commands or targets.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::ExecError;
use crate::keys::ResolvedKey;
use crate::result::Endpoint;

/// SSH client handler for russh
#[derive(Debug)]
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        // In production, this should verify against known_hosts
        Ok(true)
    }
}

/// One authenticated connection scoped to one command
pub struct SshSession {
    handle: client::Handle<ClientHandler>,
    host: String,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Dial and authenticate within `connect_timeout`
    ///
    /// The bounded dial is what keeps one unreachable target from stalling
    /// the whole run. Authentication uses the resolved key when one is
    /// available; when `agent_fallback` is set, a failed or unavailable key
    /// auth falls through to the agent on `SSH_AUTH_SOCK`.
    ///
    /// # Errors
    /// Returns `ConnectTimeout`, `ConnectionFailed` or `AuthenticationFailed`
    #[instrument(skip(key), fields(host = %endpoint.host, port = endpoint.port))]
    pub async fn connect(
        endpoint: &Endpoint,
        user: &str,
        key: &ResolvedKey,
        agent_fallback: bool,
        connect_timeout: Duration,
    ) -> Result<Self, ExecError> {
        info!(user = %user, "connecting");

        let config = Arc::new(client::Config::default());

        let mut handle = timeout(
            connect_timeout,
            client::connect(config, (&endpoint.host[..], endpoint.port), ClientHandler),
        )
        .await
        .map_err(|_| ExecError::ConnectTimeout {
            host: endpoint.host.clone(),
            timeout: connect_timeout,
        })?
        .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        match key.key() {
            Some(key_pair) => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                let auth_res = handle
                    .authenticate_publickey(
                        user,
                        PrivateKeyWithHashAlg::new(key_pair.clone(), hash_alg),
                    )
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

                if !auth_res.success() {
                    if agent_fallback {
                        warn!("public key rejected, falling back to agent");
                        authenticate_with_agent(&mut handle, user).await?;
                    } else {
                        return Err(ExecError::AuthenticationFailed(
                            "public key authentication failed".to_string(),
                        ));
                    }
                }
            }
            None => authenticate_with_agent(&mut handle, user).await?,
        }

        debug!("connected and authenticated");

        Ok(Self {
            handle,
            host: endpoint.host.clone(),
        })
    }

    /// Run `command`, streaming its stdout into the file at `path`
    ///
    /// Output is written chunk by chunk as it is produced; the drain keeps
    /// pace with the command so nothing is dropped when the remote side
    /// blocks on its stdout window. The connection is torn down on every
    /// exit path.
    ///
    /// # Errors
    /// `CommandFailed` carries the remote exit status and captured stderr;
    /// the stdout written so far is left in the file
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn run_to_file(
        mut self,
        command: &str,
        path: &Path,
        command_timeout: Option<Duration>,
    ) -> Result<(), ExecError> {
        let result = async {
            let mut file = tokio::fs::File::create(path)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            let (status, stderr) = self
                .run_bounded(command, None, &mut file, command_timeout)
                .await?;
            file.flush()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            check_status(status, stderr)
        }
        .await;
        self.teardown().await;
        result
    }

    /// Run `command`, capturing its stdout into an in-memory sink
    ///
    /// Used only for the target leg of a relayed execution.
    ///
    /// # Errors
    /// Same failure surface as [`run_to_file`](Self::run_to_file)
    #[instrument(skip(self, sink), fields(host = %self.host))]
    pub async fn run_to_sink(
        mut self,
        command: &str,
        sink: &mut Vec<u8>,
        command_timeout: Option<Duration>,
    ) -> Result<(), ExecError> {
        let result = async {
            let mut cursor = std::io::Cursor::new(&mut *sink);
            let (status, stderr) = self
                .run_bounded(command, None, &mut cursor, command_timeout)
                .await?;
            check_status(status, stderr)
        }
        .await;
        self.teardown().await;
        result
    }

    /// Run `command` with `input` fed to its stdin, stdout streamed to `path`
    ///
    /// The input is written in full and EOF is sent before the drain starts,
    /// so the remote side sees a complete, closed stream. This is the bastion
    /// leg of a relayed execution.
    ///
    /// # Errors
    /// Same failure surface as [`run_to_file`](Self::run_to_file)
    #[instrument(skip(self, input), fields(host = %self.host, input_len = input.len()))]
    pub async fn run_with_stdin_to_file(
        mut self,
        command: &str,
        input: &[u8],
        path: &Path,
        command_timeout: Option<Duration>,
    ) -> Result<(), ExecError> {
        let result = async {
            let mut file = tokio::fs::File::create(path)
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            let (status, stderr) = self
                .run_bounded(command, Some(input), &mut file, command_timeout)
                .await?;
            file.flush()
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            check_status(status, stderr)
        }
        .await;
        self.teardown().await;
        result
    }

    async fn run_bounded<W: AsyncWrite + Unpin>(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        out: &mut W,
        command_timeout: Option<Duration>,
    ) -> Result<(i32, Vec<u8>), ExecError> {
        match command_timeout {
            Some(limit) => timeout(limit, self.exec_streaming(command, stdin, out))
                .await
                .map_err(|_| ExecError::Timeout { timeout: limit })?,
            None => self.exec_streaming(command, stdin, out).await,
        }
    }

    /// Open a session channel, exec the command and drain it to completion
    ///
    /// The wait/write loop runs until the channel reports EOF, so the
    /// completion wait and the output drain proceed together.
    async fn exec_streaming<W: AsyncWrite + Unpin>(
        &mut self,
        command: &str,
        stdin: Option<&[u8]>,
        out: &mut W,
    ) -> Result<(i32, Vec<u8>), ExecError> {
        debug!(command = %command, "executing remote command");

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::ChannelFailed(e.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| ExecError::ChannelFailed(e.to_string()))?;

        if let Some(input) = stdin {
            channel
                .data(input)
                .await
                .map_err(|e| ExecError::ChannelFailed(e.to_string()))?;
            channel
                .eof()
                .await
                .map_err(|e| ExecError::ChannelFailed(e.to_string()))?;
        }

        let mut state = DrainState::default();
        let mut stderr = Vec::new();

        loop {
            let msg = channel.wait().await;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    out.write_all(&data)
                        .await
                        .map_err(|e| ExecError::IoError(e.to_string()))?;
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    state.exit_status(exit_status.cast_signed());
                }
                Some(ChannelMsg::Eof) => state.eof(),
                None => break,
                _ => {}
            }

            if state.complete() {
                break;
            }
        }

        let status = state.status();
        debug!(command = %command, status = status, "remote command completed");

        Ok((status, stderr))
    }

    /// Release the connection; runs on success and failure alike
    async fn teardown(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(host = %self.host, error = %e, "disconnect failed");
        }
    }
}

/// Tracks channel completion during the drain
///
/// The exit status may arrive before or after EOF; the drain is complete
/// only once both have been seen, or the channel itself closes.
#[derive(Debug, Default)]
struct DrainState {
    status: Option<i32>,
    eof_seen: bool,
}

impl DrainState {
    fn exit_status(&mut self, status: i32) {
        self.status = Some(status);
    }

    fn eof(&mut self) {
        self.eof_seen = true;
    }

    fn complete(&self) -> bool {
        self.eof_seen && self.status.is_some()
    }

    fn status(&self) -> i32 {
        self.status.unwrap_or(-1)
    }
}

/// Authenticate by enumerating agent identities and trying each
async fn authenticate_with_agent(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
) -> Result<(), ExecError> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|e| ExecError::AuthenticationFailed(format!("agent unavailable: {e}")))?;

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| ExecError::AuthenticationFailed(format!("agent identities: {e}")))?;

    if identities.is_empty() {
        return Err(ExecError::AuthenticationFailed(
            "agent holds no identities".to_string(),
        ));
    }

    for identity in identities {
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let result = handle
            .authenticate_publickey_with(user, identity, hash_alg, &mut agent)
            .await;

        if let Ok(auth_res) = result {
            if auth_res.success() {
                return Ok(());
            }
        }
    }

    Err(ExecError::AuthenticationFailed(
        "no agent identity accepted".to_string(),
    ))
}

fn check_status(status: i32, stderr: Vec<u8>) -> Result<(), ExecError> {
    if status == 0 {
        Ok(())
    } else {
        Err(ExecError::CommandFailed {
            status,
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }
}
