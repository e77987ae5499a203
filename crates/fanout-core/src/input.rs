//! Node-list and command-list parsing
//!
//! Both inputs are plain UTF-8 text, one entry per line, `#` for comments.
//! The parsed structures are immutable: order and duplicates are preserved
//! exactly as given.

use std::path::Path;

use tracing::info;

use crate::error::EngineError;

/// Ordered list of target identifiers
#[derive(Debug, Clone)]
pub struct NodeList {
    nodes: Vec<String>,
}

impl NodeList {
    /// Parse raw node-list text
    ///
    /// Lines are trimmed; comment lines and empty lines are excluded.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let nodes = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { nodes }
    }

    /// Read and parse the node-list file
    ///
    /// # Errors
    /// `NodesRead` if the file cannot be read
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        info!(path = %path.display(), "establishing node list");
        let text =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| EngineError::NodesRead {
                    path: path.display().to_string(),
                    source,
                })?;
        Ok(Self::parse(&text))
    }

    /// Targets in input order
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Commands bucketed by scope
///
/// A line `SCOPE:command text` lands in `local` when the scope is exactly
/// `LOCAL`; any other scope means remote.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    local: Vec<String>,
    remote: Vec<String>,
}

impl CommandSpec {
    /// Parse raw command-list text
    ///
    /// # Errors
    /// `MalformedCommand` for a non-comment line without a `:` separator
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let mut local = Vec::new();
        let mut remote = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((scope, command)) = line.split_once(':') else {
                return Err(EngineError::MalformedCommand { line: idx + 1 });
            };
            if scope == "LOCAL" {
                local.push(command.to_string());
            } else {
                remote.push(command.to_string());
            }
        }

        Ok(Self { local, remote })
    }

    /// Read and parse the command-list file
    ///
    /// # Errors
    /// `CommandsRead` if the file cannot be read, `MalformedCommand` for a
    /// broken entry
    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        info!(path = %path.display(), "establishing command list");
        let text =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| EngineError::CommandsRead {
                    path: path.display().to_string(),
                    source,
                })?;
        Self::parse(&text)
    }

    /// Commands to run on the controlling host, in input order
    #[must_use]
    pub fn local(&self) -> &[String] {
        &self.local
    }

    /// Commands to run on every target, in input order
    #[must_use]
    pub fn remote(&self) -> &[String] {
        &self.remote
    }
}
