//! SSH key resolution
//!
//! The key is read, validated and parsed once per run; the resolved value is
//! shared by every session opened afterwards.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use russh::keys::{PrivateKey, decode_secret_key, load_secret_key};
use tracing::debug;

/// Where the authentication credential comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Explicit path to a private key file
    Path(PathBuf),
    /// Use the SSH agent reachable via `SSH_AUTH_SOCK`
    Agent,
    /// Base64-encoded key material from an environment variable
    Env(String),
}

impl KeySource {
    /// Resolve the source into a parsed key or an agent marker
    ///
    /// # Errors
    /// Returns `KeyError` if the key file is missing, has permissions wider
    /// than 600, or cannot be parsed as a private key
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                validate_key_permissions(path)?;
                let key = load_secret_key(path, None)
                    .map_err(|e| KeyError::Unparsable(e.to_string()))?;
                debug!(path = %path.display(), "loaded private key");
                Ok(ResolvedKey::Key(Arc::new(key)))
            }
            KeySource::Agent => Ok(ResolvedKey::Agent),
            KeySource::Env(var_name) => {
                let base64_key =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let pem = base64_decode(&base64_key).map_err(|_| KeyError::InvalidBase64)?;
                let pem = String::from_utf8(pem).map_err(|_| KeyError::InvalidBase64)?;
                let key = decode_secret_key(&pem, None)
                    .map_err(|e| KeyError::Unparsable(e.to_string()))?;
                debug!(var = %var_name, "decoded private key from environment");
                Ok(ResolvedKey::Key(Arc::new(key)))
            }
        }
    }
}

/// Resolved credential, held for the whole run
#[derive(Debug, Clone)]
pub enum ResolvedKey {
    /// Parsed private key
    Key(Arc<PrivateKey>),
    /// No key material, authenticate through the SSH agent
    Agent,
}

impl ResolvedKey {
    /// Parsed key, if one was loaded
    #[must_use]
    pub fn key(&self) -> Option<&Arc<PrivateKey>> {
        match self {
            ResolvedKey::Key(k) => Some(k),
            ResolvedKey::Agent => None,
        }
    }

    /// Whether agent authentication applies
    #[must_use]
    pub fn use_agent(&self) -> bool {
        matches!(self, ResolvedKey::Agent)
    }
}

/// Key resolution errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("cannot parse private key: {0}")]
    Unparsable(String),

    #[error("cannot read key file: {0}")]
    Io(String),
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn validate_key_permissions(path: &PathBuf) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| KeyError::Io(e.to_string()))?;

    let mode = metadata.permissions().mode();

    // mode & 0o77 checks group and other permissions
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}
