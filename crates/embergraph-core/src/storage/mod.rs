//! # Storage
//!
//! The committed image (`state`) and the durable commit log (`log`).
//!
//! A store is backed either by memory alone or by a redb file. Both share the
//! same commit path; the in-memory backend simply has nowhere to write.

pub mod log;
pub mod state;

pub use log::{RecoveryReport, RedbLog};
pub use state::StoreState;

use crate::GraphError;
use crate::mutation::CommitRecord;

/// Storage backend type.
#[derive(Debug)]
pub enum StorageBackend {
    /// Volatile store. Nothing survives `close()`.
    InMemory,
    /// Durable store backed by a redb file.
    Persistent(RedbLog),
}

impl StorageBackend {
    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// Durably record a commit. No-op for in-memory stores.
    pub fn append(&self, record: &CommitRecord) -> Result<(), GraphError> {
        match self {
            Self::InMemory => Ok(()),
            Self::Persistent(log) => log.append(record),
        }
    }

    /// Fold the log into a snapshot of `state`. Returns the number of log
    /// records removed (always 0 for in-memory stores).
    pub fn checkpoint(&self, state: &StoreState) -> Result<u64, GraphError> {
        match self {
            Self::InMemory => Ok(0),
            Self::Persistent(log) => log.checkpoint(state),
        }
    }

    /// Log records not yet covered by a checkpoint.
    pub fn pending_records(&self) -> Result<u64, GraphError> {
        match self {
            Self::InMemory => Ok(0),
            Self::Persistent(log) => log.pending_records(),
        }
    }
}
