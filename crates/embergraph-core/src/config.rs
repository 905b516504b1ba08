//! # Store Configuration
//!
//! `StoreConfig` carries the store path plus the handful of tunables the
//! coordinator and the durable log consult. It can be built in code or parsed
//! from a TOML file:
//!
//! ```toml
//! path = "embergraph-store"
//! commit_timeout_ms = 5000
//! shutdown_timeout_ms = 30000
//! checkpoint_interval = 1000
//! checkpoint_on_close = true
//! ```
//!
//! Omitted fields fall back to their defaults. Omitting `path` yields an
//! in-memory store.

use crate::GraphError;
use crate::primitives::{DEFAULT_COMMIT_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for opening a `GraphDatabase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Store directory. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// How long a committer waits for the commit gate before `Timeout`.
    pub commit_timeout_ms: u64,
    /// How long `close()` waits for in-flight transactions before `Timeout`.
    pub shutdown_timeout_ms: u64,
    /// Write a checkpoint after this many commits. 0 disables it.
    pub checkpoint_interval: u64,
    /// Write a checkpoint when the store is closed.
    pub checkpoint_on_close: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            commit_timeout_ms: DEFAULT_COMMIT_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            checkpoint_interval: 0,
            checkpoint_on_close: true,
        }
    }
}

impl StoreConfig {
    /// Configuration for a durable store rooted at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Configuration for a volatile, in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text)
            .map_err(|e| GraphError::InvalidInput(format!("Invalid store configuration: {}", e)))
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Builder-style override of the commit timeout.
    #[must_use]
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder-style override of the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder-style override of the automatic checkpoint interval.
    #[must_use]
    pub fn with_checkpoint_interval(mut self, commits: u64) -> Self {
        self.checkpoint_interval = commits;
        self
    }

    #[must_use]
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Whether this configuration describes a durable store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }
}
