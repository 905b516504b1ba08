//! # embergraph-core
//!
//! An embedded, transactional property-graph store.
//!
//! Nodes and typed, directed relationships carry scalar properties. Named
//! node indexes map `(key, value)` pairs to nodes and are maintained only by
//! explicit calls. Every change happens inside a `Transaction`; a commit is
//! recorded as one write-ahead log record in a redb file before it becomes
//! visible, and the store recovers its committed state on open.
//!
//! ## Layers
//!
//! - `types`, `primitives`, `config`: values, constants and tunables
//! - `graph`, `index`: the committed image and its read surface
//! - `mutation`, `formats`, `storage`: commit records, framing, log and recovery
//! - `coordinator`, `transaction`, `api`: isolation, validation and writes
//! - `database`: the `GraphDatabase` handle
//!
//! The core has no async and no network code. Signal handling and process
//! shutdown belong to the embedding application, which calls
//! `GraphDatabase::close()`.

// =============================================================================
// MODULES
// =============================================================================

pub mod api;
pub mod config;
mod coordinator;
pub mod database;
pub mod formats;
pub mod graph;
pub mod index;
pub mod mutation;
pub mod primitives;
pub mod storage;
pub mod transaction;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Direction, GraphError, Node, NodeId, Properties, PropertyValue, Relationship, RelationshipId,
    RelationshipType, TransactionId, TransactionState,
};

// =============================================================================
// RE-EXPORTS: Graph API
// =============================================================================

pub use config::StoreConfig;
pub use database::{GraphDatabase, Snapshot, StoreStats};
pub use graph::{Graph, GraphRead, Relationships};
pub use index::{IndexEntry, IndexHits, IndexManager};
pub use mutation::{CommitRecord, Mutation};
pub use storage::{RecoveryReport, RedbLog, StorageBackend, StoreState};
pub use transaction::Transaction;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{FrameHeader, decode_frame, encode_frame};
