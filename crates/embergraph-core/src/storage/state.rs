//! # Committed Store State
//!
//! `StoreState` is everything a reader can observe: the graph image, the
//! indexes, the last commit sequence and the id high-water marks. It is the
//! unit of checkpointing and the target of log replay.

use crate::graph::Graph;
use crate::index::{IndexEntry, IndexManager};
use crate::mutation::{CommitRecord, Mutation};
use crate::{GraphError, Relationship};
use serde::{Deserialize, Serialize};

/// The committed image of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreState {
    pub graph: Graph,
    pub indexes: IndexManager,
    /// Sequence of the last applied commit. 0 for a fresh store.
    pub last_sequence: u64,
    /// Next node id to hand out.
    pub next_node_id: u64,
    /// Next relationship id to hand out.
    pub next_relationship_id: u64,
}

impl StoreState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one commit record.
    ///
    /// The record must carry the next sequence number. Entities touched by
    /// the record get its sequence as their version. Deleting a node also
    /// purges any index entries still referencing it.
    ///
    /// On error the state may be partially modified; callers apply to a
    /// scratch copy or treat the error as fatal.
    pub fn apply(&mut self, record: &CommitRecord) -> Result<(), GraphError> {
        let expected = self.last_sequence + 1;
        if record.sequence != expected {
            return Err(GraphError::StoreCorrupt(format!(
                "Commit sequence {} out of order (expected {})",
                record.sequence, expected
            )));
        }

        let version = record.sequence;
        for mutation in &record.mutations {
            match mutation {
                Mutation::CreateNode { node } => self.graph.insert_node(*node, version)?,
                Mutation::DeleteNode { node } => {
                    self.graph.remove_node(*node)?;
                    self.indexes.purge_node(*node);
                }
                Mutation::SetNodeProperty { node, key, value } => {
                    self.graph
                        .set_node_property(*node, key.clone(), value.clone(), version)?
                }
                Mutation::RemoveNodeProperty { node, key } => {
                    self.graph.remove_node_property(*node, key, version)?
                }
                Mutation::CreateRelationship {
                    relationship,
                    rel_type,
                    start,
                    end,
                } => self.graph.insert_relationship(
                    Relationship::new(*relationship, rel_type.clone(), *start, *end),
                    version,
                )?,
                Mutation::DeleteRelationship { relationship } => {
                    self.graph.remove_relationship(*relationship)?
                }
                Mutation::SetRelationshipProperty {
                    relationship,
                    key,
                    value,
                } => self.graph.set_relationship_property(
                    *relationship,
                    key.clone(),
                    value.clone(),
                    version,
                )?,
                Mutation::RemoveRelationshipProperty { relationship, key } => self
                    .graph
                    .remove_relationship_property(*relationship, key, version)?,
                Mutation::IndexAdd {
                    index,
                    node,
                    key,
                    value,
                } => {
                    if !self.graph.contains_node(*node) {
                        return Err(GraphError::ConsistencyViolation(format!(
                            "index '{}' entry references missing {}",
                            index, node
                        )));
                    }
                    self.indexes.add(IndexEntry {
                        index: index.clone(),
                        node: *node,
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
                Mutation::IndexRemove {
                    index,
                    node,
                    key,
                    value,
                } => {
                    self.indexes.remove(&IndexEntry {
                        index: index.clone(),
                        node: *node,
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        self.last_sequence = record.sequence;
        self.next_node_id = self.next_node_id.max(record.next_node_id);
        self.next_relationship_id = self.next_relationship_id.max(record.next_relationship_id);
        Ok(())
    }
}
