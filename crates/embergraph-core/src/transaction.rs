//! # Transactions
//!
//! A `Transaction` reads a fixed committed snapshot (taken at `begin()`)
//! merged with its own staged writes, and publishes those writes atomically
//! on commit.
//!
//! ## Lifecycle
//!
//! ```text
//! Active --finish (marked)--> Committing --> Committed
//!        \--finish / rollback / drop--> RollingBack --> RolledBack
//! ```
//!
//! A failed commit ends in `RolledBack`. Every operation on a finished
//! transaction fails with `TransactionNotActive`.
//!
//! Transactions are bound to the thread that began them and are `!Send`.
//! The write operations live in `api.rs`.

use crate::coordinator::{CommitRequest, Coordinator};
use crate::graph::{GraphRead, Relationships};
use crate::index::{IndexEntry, IndexHits};
use crate::mutation::Mutation;
use crate::storage::StoreState;
use crate::{
    Direction, GraphError, Node, NodeId, PropertyValue, Relationship, RelationshipId,
    RelationshipType, TransactionId, TransactionState,
};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Staged property writes: `None` marks a removal.
pub(crate) type PropertyDelta = BTreeMap<String, Option<PropertyValue>>;

/// Writes staged by one transaction, not yet visible to anyone else.
#[derive(Debug, Default)]
pub(crate) struct Overlay {
    pub created_nodes: BTreeSet<NodeId>,
    pub deleted_nodes: BTreeSet<NodeId>,
    pub node_props: BTreeMap<NodeId, PropertyDelta>,
    pub created_relationships: BTreeMap<RelationshipId, Relationship>,
    pub deleted_relationships: BTreeSet<RelationshipId>,
    pub relationship_props: BTreeMap<RelationshipId, PropertyDelta>,
    pub index_added: BTreeSet<IndexEntry>,
    pub index_removed: BTreeSet<IndexEntry>,
    /// Ordered log of the above, replayed on commit.
    pub mutations: Vec<Mutation>,
}

impl Overlay {
    fn into_request(self, transaction: TransactionId, start_sequence: u64) -> CommitRequest {
        let written_nodes = self
            .node_props
            .keys()
            .chain(self.deleted_nodes.iter())
            .filter(|id| !self.created_nodes.contains(*id))
            .copied()
            .collect();
        let written_relationships = self
            .relationship_props
            .keys()
            .chain(self.deleted_relationships.iter())
            .filter(|id| !self.created_relationships.contains_key(*id))
            .copied()
            .collect();
        CommitRequest {
            transaction,
            start_sequence,
            mutations: self.mutations,
            written_nodes,
            written_relationships,
        }
    }
}

fn merge_properties(properties: &mut crate::Properties, delta: Option<&PropertyDelta>) {
    for (key, value) in delta.into_iter().flatten() {
        match value {
            Some(value) => {
                properties.insert(key.clone(), value.clone());
            }
            None => {
                properties.remove(key);
            }
        }
    }
}

/// An open unit of work against a `GraphDatabase`.
pub struct Transaction {
    id: TransactionId,
    coordinator: Arc<Coordinator>,
    snapshot: Arc<StoreState>,
    start_sequence: u64,
    pub(crate) overlay: Overlay,
    state: TransactionState,
    marked_success: bool,
    /// Keeps the transaction on the thread that began it.
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("start_sequence", &self.start_sequence)
            .field("staged", &self.overlay.mutations.len())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        coordinator: Arc<Coordinator>,
        snapshot: Arc<StoreState>,
    ) -> Self {
        Self {
            id,
            coordinator,
            start_sequence: snapshot.last_sequence,
            snapshot,
            overlay: Overlay::default(),
            state: TransactionState::Active,
            marked_success: false,
            _not_send: PhantomData,
        }
    }

    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Number of staged mutations.
    #[must_use]
    pub fn pending_mutations(&self) -> usize {
        self.overlay.mutations.len()
    }

    pub(crate) fn ensure_active(&self) -> Result<(), GraphError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(GraphError::TransactionNotActive(self.state))
        }
    }

    pub(crate) fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub(crate) fn snapshot(&self) -> &StoreState {
        &self.snapshot
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Mark the transaction to be committed by `finish()`.
    pub fn success(&mut self) -> Result<(), GraphError> {
        self.ensure_active()?;
        self.marked_success = true;
        Ok(())
    }

    /// Clear a previous `success()` mark so `finish()` rolls back.
    pub fn failure(&mut self) -> Result<(), GraphError> {
        self.ensure_active()?;
        self.marked_success = false;
        Ok(())
    }

    /// Commit if marked with `success()`, otherwise roll back.
    pub fn finish(&mut self) -> Result<(), GraphError> {
        self.ensure_active()?;
        if self.marked_success {
            self.do_commit()
        } else {
            self.do_rollback();
            Ok(())
        }
    }

    /// Shorthand for `success()` followed by `finish()`.
    pub fn commit(&mut self) -> Result<(), GraphError> {
        self.success()?;
        self.finish()
    }

    /// Discard every staged write.
    pub fn rollback(&mut self) -> Result<(), GraphError> {
        self.ensure_active()?;
        self.do_rollback();
        Ok(())
    }

    fn do_commit(&mut self) -> Result<(), GraphError> {
        self.state = TransactionState::Committing;
        let request =
            std::mem::take(&mut self.overlay).into_request(self.id, self.start_sequence);
        // The overlay is gone, so the snapshot is no longer needed either.
        self.snapshot = Arc::default();

        let result = self.coordinator.commit(request);
        self.coordinator.release(self.id);
        match result {
            Ok(_) => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(e) => {
                debug!(transaction = %self.id, "Commit failed, rolled back: {}", e);
                self.state = TransactionState::RolledBack;
                Err(e)
            }
        }
    }

    fn do_rollback(&mut self) {
        self.state = TransactionState::RollingBack;
        let discarded = std::mem::take(&mut self.overlay).mutations.len();
        self.snapshot = Arc::default();
        self.coordinator.release(self.id);
        self.state = TransactionState::RolledBack;
        debug!(transaction = %self.id, discarded, "Transaction rolled back");
    }

    // =========================================================================
    // VISIBILITY
    // =========================================================================

    pub(crate) fn node_visible(&self, id: NodeId) -> bool {
        !self.overlay.deleted_nodes.contains(&id)
            && (self.overlay.created_nodes.contains(&id) || self.snapshot.graph.contains_node(id))
    }

    pub(crate) fn relationship_visible(&self, id: RelationshipId) -> bool {
        !self.overlay.deleted_relationships.contains(&id)
            && (self.overlay.created_relationships.contains_key(&id)
                || self.snapshot.graph.contains_relationship(id))
    }

    /// Whether an exact index entry is visible, regardless of whether its
    /// node has been deleted in this transaction.
    pub(crate) fn index_entry_visible(&self, entry: &IndexEntry) -> bool {
        self.overlay.index_added.contains(entry)
            || (self.snapshot.indexes.contains(entry) && !self.overlay.index_removed.contains(entry))
    }

    /// Visible index entries of `node` in `index`.
    pub(crate) fn index_entries_for(&self, index: &str, node: NodeId) -> Vec<IndexEntry> {
        let mut entries: BTreeSet<IndexEntry> = self
            .snapshot
            .indexes
            .entries_for(index, node)
            .into_iter()
            .filter(|e| !self.overlay.index_removed.contains(e))
            .collect();
        entries.extend(
            self.overlay
                .index_added
                .iter()
                .filter(|e| e.index == index && e.node == node)
                .cloned(),
        );
        entries.into_iter().collect()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.do_rollback();
        }
    }
}

// =============================================================================
// READ SURFACE
// =============================================================================

impl GraphRead for Transaction {
    fn contains_node(&self, id: NodeId) -> bool {
        self.is_active() && self.node_visible(id)
    }

    fn node(&self, id: NodeId) -> Result<Node, GraphError> {
        self.ensure_active()?;
        if !self.node_visible(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let mut node = self.snapshot.graph.node(id).unwrap_or_else(|| Node::new(id));
        merge_properties(&mut node.properties, self.overlay.node_props.get(&id));
        Ok(node)
    }

    fn relationship(&self, id: RelationshipId) -> Result<Relationship, GraphError> {
        self.ensure_active()?;
        if !self.relationship_visible(id) {
            return Err(GraphError::RelationshipNotFound(id));
        }
        let mut rel = self
            .overlay
            .created_relationships
            .get(&id)
            .or_else(|| self.snapshot.graph.relationship(id))
            .cloned()
            .ok_or(GraphError::RelationshipNotFound(id))?;
        merge_properties(&mut rel.properties, self.overlay.relationship_props.get(&id));
        Ok(rel)
    }

    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[RelationshipType],
    ) -> Result<Relationships, GraphError> {
        self.ensure_active()?;
        if !self.node_visible(node) {
            return Err(GraphError::NodeNotFound(node));
        }

        let mut ids: BTreeSet<RelationshipId> = self
            .snapshot
            .graph
            .relationship_ids(node, direction)
            .into_iter()
            .collect();
        ids.extend(
            self.overlay
                .created_relationships
                .values()
                .filter(|r| r.matches(node, direction))
                .map(|r| r.id),
        );

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.relationship_visible(id) {
                continue;
            }
            let rel = self.relationship(id)?;
            if types.is_empty() || types.contains(&rel.rel_type) {
                items.push(rel);
            }
        }
        Ok(Relationships::new(items))
    }

    fn node_ids(&self) -> Vec<NodeId> {
        if !self.is_active() {
            return Vec::new();
        }
        let mut ids: BTreeSet<NodeId> = self.snapshot.graph.node_ids().collect();
        ids.extend(self.overlay.created_nodes.iter().copied());
        ids.retain(|id| !self.overlay.deleted_nodes.contains(id));
        ids.into_iter().collect()
    }

    fn node_count(&self) -> usize {
        self.node_ids().len()
    }

    fn relationship_count(&self) -> usize {
        if !self.is_active() {
            return 0;
        }
        let created = self
            .overlay
            .created_relationships
            .keys()
            .filter(|id| !self.overlay.deleted_relationships.contains(*id))
            .count();
        let deleted_committed = self
            .overlay
            .deleted_relationships
            .iter()
            .filter(|id| self.snapshot.graph.contains_relationship(**id))
            .count();
        self.snapshot.graph.relationship_count() + created - deleted_committed
    }

    fn index_get(&self, index: &str, key: &str, value: &PropertyValue) -> IndexHits {
        if !self.is_active() {
            return IndexHits::new(index, key, Vec::new());
        }
        let mut nodes: BTreeSet<NodeId> = self
            .snapshot
            .indexes
            .get(index, key, value)
            .into_iter()
            .filter(|node| {
                !self.overlay.index_removed.contains(&IndexEntry {
                    index: index.to_string(),
                    node: *node,
                    key: key.to_string(),
                    value: value.clone(),
                })
            })
            .collect();
        nodes.extend(
            self.overlay
                .index_added
                .iter()
                .filter(|e| e.matches(index, key, value))
                .map(|e| e.node),
        );
        nodes.retain(|node| self.node_visible(*node));
        IndexHits::new(index, key, nodes.into_iter().collect())
    }
}
