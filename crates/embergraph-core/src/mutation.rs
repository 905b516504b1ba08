//! # Mutations
//!
//! The unit of change recorded by a transaction and replayed from the
//! write-ahead log.
//!
//! A transaction stages an ordered `Vec<Mutation>`. On commit the whole list
//! becomes one `CommitRecord`, which is appended to the log and then applied
//! to the committed image. Recovery replays the same records in sequence order.

use crate::{NodeId, PropertyValue, RelationshipId, RelationshipType, TransactionId};
use serde::{Deserialize, Serialize};

/// A single staged change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    CreateNode {
        node: NodeId,
    },
    DeleteNode {
        node: NodeId,
    },
    SetNodeProperty {
        node: NodeId,
        key: String,
        value: PropertyValue,
    },
    RemoveNodeProperty {
        node: NodeId,
        key: String,
    },
    CreateRelationship {
        relationship: RelationshipId,
        rel_type: RelationshipType,
        start: NodeId,
        end: NodeId,
    },
    DeleteRelationship {
        relationship: RelationshipId,
    },
    SetRelationshipProperty {
        relationship: RelationshipId,
        key: String,
        value: PropertyValue,
    },
    RemoveRelationshipProperty {
        relationship: RelationshipId,
        key: String,
    },
    IndexAdd {
        index: String,
        node: NodeId,
        key: String,
        value: PropertyValue,
    },
    IndexRemove {
        index: String,
        node: NodeId,
        key: String,
        value: PropertyValue,
    },
}

impl Mutation {
    /// Whether this mutation touches index state rather than graph state.
    #[must_use]
    pub fn is_index_mutation(&self) -> bool {
        matches!(self, Self::IndexAdd { .. } | Self::IndexRemove { .. })
    }
}

/// One committed transaction as it is written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit sequence number. Strictly increasing by one per commit.
    pub sequence: u64,
    /// Transaction that produced this record.
    pub transaction: TransactionId,
    /// Node id high-water mark at commit time.
    pub next_node_id: u64,
    /// Relationship id high-water mark at commit time.
    pub next_relationship_id: u64,
    /// Ordered changes.
    pub mutations: Vec<Mutation>,
}

impl CommitRecord {
    /// Count of graph (non-index) mutations in this record.
    #[must_use]
    pub fn graph_mutation_count(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| !m.is_index_mutation())
            .count()
    }
}
