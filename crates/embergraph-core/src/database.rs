//! # Graph Database Handle
//!
//! `GraphDatabase` is the entry point of the crate: a cheap-to-clone handle
//! over one open store. There is no global instance; callers pass the handle
//! to whatever needs it.
//!
//! ```no_run
//! use embergraph_core::{GraphDatabase, GraphRead};
//!
//! # fn main() -> Result<(), embergraph_core::GraphError> {
//! let db = GraphDatabase::open("embergraph-store")?;
//! let mut tx = db.begin()?;
//! let user = tx.create_node()?;
//! tx.set_node_property(user, "username", "user1@embergraph.org")?;
//! tx.index_add("nodes", user, "username", "user1@embergraph.org")?;
//! tx.commit()?;
//!
//! let found = db.snapshot().index_get("nodes", "username", &"user1@embergraph.org".into());
//! assert_eq!(found.single()?, user);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use crate::coordinator::Coordinator;
use crate::graph::{GraphRead, Relationships};
use crate::index::IndexHits;
use crate::storage::StoreState;
use crate::transaction::Transaction;
use crate::{
    Direction, GraphError, Node, NodeId, PropertyValue, Relationship, RelationshipId,
    RelationshipType,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// DATABASE
// =============================================================================

/// Handle to an open graph store. Clones share the same store.
#[derive(Debug, Clone)]
pub struct GraphDatabase {
    inner: Arc<Coordinator>,
}

impl GraphDatabase {
    /// Open (or create) a durable store in directory `path`.
    ///
    /// # Errors
    ///
    /// `StoreCorrupt` if the existing files cannot be recovered, `IoError`
    /// if they cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        Self::open_with(StoreConfig::new(path))
    }

    /// Open a store described by `config`.
    pub fn open_with(config: StoreConfig) -> Result<Self, GraphError> {
        Ok(Self {
            inner: Coordinator::open(config)?,
        })
    }

    /// Open a volatile store that lives only as long as its handles.
    pub fn in_memory() -> Result<Self, GraphError> {
        Self::open_with(StoreConfig::in_memory())
    }

    /// Begin a transaction bound to the calling thread.
    ///
    /// # Errors
    ///
    /// `TransactionInProgress` if this thread already has an active
    /// transaction, `StoreClosed` once `close()` has started.
    pub fn begin(&self) -> Result<Transaction, GraphError> {
        self.inner.begin()
    }

    /// Run `work` in a transaction: commit on `Ok`, roll back on `Err`.
    pub fn execute<T, F>(&self, work: F) -> Result<T, GraphError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, GraphError>,
    {
        let mut tx = self.begin()?;
        match work(&mut tx) {
            Ok(value) => {
                if tx.is_active() {
                    tx.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                if tx.is_active() {
                    tx.rollback()?;
                }
                Err(e)
            }
        }
    }

    /// A read-only view of the current committed state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.inner.snapshot(),
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.snapshot().graph.node_count()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.inner.snapshot().graph.relationship_count()
    }

    /// Names of all indexes that have ever held an entry.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.inner.snapshot().indexes.names()
    }

    /// Counters describing the store.
    pub fn stats(&self) -> Result<StoreStats, GraphError> {
        let state = self.inner.snapshot();
        let pending_log_records = if self.inner.is_closed() {
            0
        } else {
            self.inner.pending_log_records()?
        };
        Ok(StoreStats {
            persistent: self.inner.is_persistent(),
            node_count: state.graph.node_count(),
            relationship_count: state.graph.relationship_count(),
            indexes: state
                .indexes
                .names()
                .into_iter()
                .map(|name| {
                    let count = state.indexes.entry_count(&name);
                    (name, count)
                })
                .collect(),
            last_sequence: state.last_sequence,
            pending_log_records,
            active_transactions: self.inner.active_transactions(),
            closed: self.inner.is_closed(),
        })
    }

    /// Fold the log into a snapshot. Returns the number of log records
    /// removed (0 for in-memory stores).
    pub fn checkpoint(&self) -> Result<u64, GraphError> {
        if self.inner.is_closed() {
            return Err(GraphError::StoreClosed);
        }
        self.inner.checkpoint()
    }

    /// Close the store.
    ///
    /// Stops new transactions, waits up to `shutdown_timeout_ms` for active
    /// ones, checkpoints if configured and releases the store files. Safe to
    /// call from any thread and more than once.
    ///
    /// # Errors
    ///
    /// `Timeout` if transactions are still active when the wait expires (the
    /// store keeps serving and `close()` may be retried).
    /// `TransactionInProgress` if the calling thread itself holds one.
    pub fn close(&self) -> Result<(), GraphError> {
        self.inner.close()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        self.inner.config()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// An immutable view of the committed state at one point in time.
///
/// Later commits are not visible through it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: Arc<StoreState>,
}

impl Snapshot {
    /// Sequence of the last commit visible in this snapshot.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.state.last_sequence
    }

    /// The underlying committed state.
    #[must_use]
    pub fn state(&self) -> &StoreState {
        &self.state
    }
}

impl GraphRead for Snapshot {
    fn contains_node(&self, id: NodeId) -> bool {
        self.state.graph.contains_node(id)
    }

    fn node(&self, id: NodeId) -> Result<Node, GraphError> {
        self.state.graph.node(id).ok_or(GraphError::NodeNotFound(id))
    }

    fn relationship(&self, id: RelationshipId) -> Result<Relationship, GraphError> {
        self.state
            .graph
            .relationship(id)
            .cloned()
            .ok_or(GraphError::RelationshipNotFound(id))
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[RelationshipType],
    ) -> Result<Relationships, GraphError> {
        if !self.state.graph.contains_node(node) {
            return Err(GraphError::NodeNotFound(node));
        }
        let items = self
            .state
            .graph
            .relationship_ids(node, direction)
            .into_iter()
            .filter_map(|id| self.state.graph.relationship(id))
            .filter(|r| types.is_empty() || types.contains(&r.rel_type))
            .cloned()
            .collect();
        Ok(Relationships::new(items))
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.state.graph.node_ids().collect()
    }

    fn node_count(&self) -> usize {
        self.state.graph.node_count()
    }

    fn relationship_count(&self) -> usize {
        self.state.graph.relationship_count()
    }

    fn index_get(&self, index: &str, key: &str, value: &PropertyValue) -> IndexHits {
        IndexHits::new(index, key, self.state.indexes.get(index, key, value))
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Store counters, as reported by `embergraph status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub persistent: bool,
    pub node_count: usize,
    pub relationship_count: usize,
    /// Index name -> entry count.
    pub indexes: BTreeMap<String, usize>,
    pub last_sequence: u64,
    /// Log records not yet folded into a checkpoint.
    pub pending_log_records: u64,
    pub active_transactions: usize,
    pub closed: bool,
}
