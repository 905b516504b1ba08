//! # redb-backed Commit Log
//!
//! The durable half of the store. One redb database file holds:
//!
//! - `wal`: commit sequence -> framed `CommitRecord`
//! - `checkpoint`: `"snapshot"` -> framed `StoreState`
//! - `metadata`: bookkeeping counters
//!
//! A commit is one redb write transaction appending one record. A checkpoint
//! is one redb write transaction that stores the snapshot and deletes every
//! log record it covers, so the file never holds a half-applied checkpoint.

use crate::formats::{decode_frame, encode_frame};
use crate::mutation::CommitRecord;
use crate::primitives::STORE_FILE_NAME;
use crate::storage::state::StoreState;
use crate::GraphError;
use redb::{
    Database, DatabaseError, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    StorageError, TableDefinition,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Table for the write-ahead log: sequence(u64) -> framed record bytes
const WAL: TableDefinition<u64, &[u8]> = TableDefinition::new("wal");

/// Table for the checkpoint snapshot: name -> framed state bytes
const CHECKPOINT: TableDefinition<&str, &[u8]> = TableDefinition::new("checkpoint");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const SNAPSHOT_KEY: &str = "snapshot";
const CHECKPOINT_SEQUENCE_KEY: &str = "checkpoint_sequence";
const LAST_SEQUENCE_KEY: &str = "last_sequence";

/// What recovery found on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Sequence covered by the loaded checkpoint (0 if none).
    pub checkpoint_sequence: u64,
    /// Number of log records replayed on top of the checkpoint.
    pub replayed: u64,
}

/// The durable commit log of one store directory.
pub struct RedbLog {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> GraphError {
    GraphError::IoError(e.to_string())
}

impl RedbLog {
    /// Open (or create) the store in directory `dir` and rebuild its
    /// committed state from the checkpoint plus the log suffix.
    pub fn open(dir: impl AsRef<Path>) -> Result<(Self, StoreState, RecoveryReport), GraphError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            GraphError::IoError(format!("Cannot create store '{}': {}", dir.display(), e))
        })?;
        let path = dir.join(STORE_FILE_NAME);

        let db = Database::create(&path).map_err(|e| match e {
            DatabaseError::Storage(StorageError::Corrupted(msg)) => GraphError::StoreCorrupt(msg),
            DatabaseError::UpgradeRequired(version) => GraphError::StoreCorrupt(format!(
                "Unsupported redb file format version {}",
                version
            )),
            other => io_err(other),
        })?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(WAL).map_err(io_err)?;
            let _ = write_txn.open_table(CHECKPOINT).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let log = Self { db, path };
        let (state, report) = log.recover()?;
        info!(
            path = %log.path.display(),
            checkpoint_sequence = report.checkpoint_sequence,
            replayed = report.replayed,
            last_sequence = state.last_sequence,
            "Store recovered"
        );
        Ok((log, state, report))
    }

    fn recover(&self) -> Result<(StoreState, RecoveryReport), GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;

        let mut state = {
            let table = read_txn.open_table(CHECKPOINT).map_err(io_err)?;
            match table.get(SNAPSHOT_KEY).map_err(io_err)? {
                Some(bytes) => decode_frame::<StoreState>(bytes.value()).map_err(|e| {
                    warn!("Checkpoint snapshot unreadable: {}", e);
                    e
                })?,
                None => StoreState::new(),
            }
        };
        let checkpoint_sequence = state.last_sequence;

        let table = read_txn.open_table(WAL).map_err(io_err)?;
        let mut replayed = 0u64;
        for entry in table.range((checkpoint_sequence + 1)..).map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            let sequence = key.value();
            let record: CommitRecord = decode_frame(value.value()).map_err(|e| {
                warn!("WAL corruption detected at sequence {}", sequence);
                e
            })?;
            if record.sequence != sequence {
                warn!("WAL corruption detected at sequence {}", sequence);
                return Err(GraphError::StoreCorrupt(format!(
                    "Record stored under sequence {} claims sequence {}",
                    sequence, record.sequence
                )));
            }
            state.apply(&record).map_err(|e| {
                warn!("WAL record {} does not apply: {}", sequence, e);
                match e {
                    GraphError::StoreCorrupt(msg) => GraphError::StoreCorrupt(msg),
                    other => GraphError::StoreCorrupt(format!(
                        "Record {} does not apply: {}",
                        sequence, other
                    )),
                }
            })?;
            replayed += 1;
        }

        let meta = read_txn.open_table(METADATA).map_err(io_err)?;
        let logged = meta
            .get(LAST_SEQUENCE_KEY)
            .map_err(io_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        if logged > state.last_sequence {
            warn!(
                logged,
                recovered = state.last_sequence,
                "WAL ends before its last appended record"
            );
            return Err(GraphError::StoreCorrupt(format!(
                "Log recorded sequence {} but only {} could be recovered",
                logged, state.last_sequence
            )));
        }

        Ok((
            state,
            RecoveryReport {
                checkpoint_sequence,
                replayed,
            },
        ))
    }

    /// Durably append one commit record.
    pub fn append(&self, record: &CommitRecord) -> Result<(), GraphError> {
        let bytes = encode_frame(record)?;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut wal = write_txn.open_table(WAL).map_err(io_err)?;
            wal.insert(record.sequence, bytes.as_slice())
                .map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert(LAST_SEQUENCE_KEY, record.sequence)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        debug!(
            sequence = record.sequence,
            bytes = bytes.len(),
            "WAL record appended"
        );
        Ok(())
    }

    /// Store `state` as the checkpoint and drop the log records it covers.
    /// Returns the number of records removed.
    pub fn checkpoint(&self, state: &StoreState) -> Result<u64, GraphError> {
        let bytes = encode_frame(state)?;
        let through = state.last_sequence;

        let write_txn = self.db.begin_write().map_err(io_err)?;
        let removed = {
            let mut snapshot = write_txn.open_table(CHECKPOINT).map_err(io_err)?;
            snapshot
                .insert(SNAPSHOT_KEY, bytes.as_slice())
                .map_err(io_err)?;

            let mut wal = write_txn.open_table(WAL).map_err(io_err)?;
            let mut covered = Vec::new();
            for entry in wal.range(..=through).map_err(io_err)? {
                let (key, _) = entry.map_err(io_err)?;
                covered.push(key.value());
            }
            for sequence in &covered {
                wal.remove(*sequence).map_err(io_err)?;
            }

            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            meta.insert(CHECKPOINT_SEQUENCE_KEY, through)
                .map_err(io_err)?;
            covered.len() as u64
        };
        write_txn.commit().map_err(io_err)?;

        info!(
            sequence = through,
            truncated = removed,
            bytes = bytes.len(),
            "Checkpoint written"
        );
        Ok(removed)
    }

    /// Number of log records not yet folded into a checkpoint.
    pub fn pending_records(&self) -> Result<u64, GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(WAL).map_err(io_err)?;
        table.len().map_err(io_err)
    }

    /// Sequence covered by the current checkpoint (0 if none).
    pub fn checkpoint_sequence(&self) -> Result<u64, GraphError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(METADATA).map_err(io_err)?;
        Ok(table
            .get(CHECKPOINT_SEQUENCE_KEY)
            .map_err(io_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    /// Path of the redb file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// =============================================================================
// TESTS
// =============================================================================
