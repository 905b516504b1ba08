//! # Graph Image
//!
//! The committed, in-memory image of nodes, relationships and adjacency.
//!
//! This module also defines the `GraphRead` trait: the read surface shared by
//! a live `Transaction` (committed snapshot merged with staged writes) and a
//! read-only `Snapshot`. All structures use `BTreeMap`/`BTreeSet`, so
//! traversal order is relationship id order, which is insertion order.

use crate::index::IndexHits;
use crate::{
    Direction, GraphError, Node, NodeId, Properties, PropertyValue, Relationship, RelationshipId,
    RelationshipType,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// GRAPHREAD TRAIT
// =============================================================================

/// The GraphRead trait defines the read operations of the Graph API.
///
/// Implemented by `Transaction` (read-your-own-writes) and by `Snapshot`
/// (committed state only).
pub trait GraphRead {
    /// Check if a node is visible.
    fn contains_node(&self, id: NodeId) -> bool;

    /// Get an owned snapshot of a node and its properties.
    fn node(&self, id: NodeId) -> Result<Node, GraphError>;

    /// Get a relationship by id.
    fn relationship(&self, id: RelationshipId) -> Result<Relationship, GraphError>;

    /// Relationships of `node` in `direction`, restricted to `types` unless
    /// `types` is empty. Ordered by relationship id.
    fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        types: &[RelationshipType],
    ) -> Result<Relationships, GraphError>;

    /// All visible node ids in ascending order.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Get the number of visible nodes.
    fn node_count(&self) -> usize;

    /// Get the number of visible relationships.
    fn relationship_count(&self) -> usize;

    /// Look up nodes in a named index by exact `(key, value)`.
    fn index_get(&self, index: &str, key: &str, value: &PropertyValue) -> IndexHits;

    /// Get one property of a node.
    fn node_property(&self, id: NodeId, key: &str) -> Result<PropertyValue, GraphError> {
        self.node(id)?
            .properties
            .remove(key)
            .ok_or_else(|| GraphError::PropertyNotFound(key.to_string()))
    }

    /// Get one property of a relationship.
    fn relationship_property(
        &self,
        id: RelationshipId,
        key: &str,
    ) -> Result<PropertyValue, GraphError> {
        self.relationship(id)?
            .properties
            .remove(key)
            .ok_or_else(|| GraphError::PropertyNotFound(key.to_string()))
    }
}

// =============================================================================
// RELATIONSHIP SEQUENCE
// =============================================================================

/// The result of a traversal: a finite sequence of relationships that can be
/// iterated as many times as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    /// Wrap an already ordered list.
    #[must_use]
    pub fn new(items: Vec<Relationship>) -> Self {
        Self { items }
    }

    /// Iterate from the beginning. Each call restarts the sequence.
    pub fn iter(&self) -> std::slice::Iter<'_, Relationship> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The node at the far end of each relationship, as seen from `anchor`.
    pub fn other_nodes(&self, anchor: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.items.iter().filter_map(move |r| r.other_node(anchor))
    }

    /// The end node of each relationship, in sequence order.
    pub fn end_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items.iter().map(|r| r.end)
    }

    /// Ids of the relationships in this sequence.
    pub fn ids(&self) -> impl Iterator<Item = RelationshipId> + '_ {
        self.items.iter().map(|r| r.id)
    }
}

impl IntoIterator for Relationships {
    type Item = Relationship;
    type IntoIter = std::vec::IntoIter<Relationship>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Relationships {
    type Item = &'a Relationship;
    type IntoIter = std::slice::Iter<'a, Relationship>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// A committed node: its properties and the sequence of the last commit that
/// modified it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct NodeRecord {
    properties: Properties,
    version: u64,
}

/// A committed relationship with its last-modified commit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RelationshipRecord {
    relationship: Relationship,
    version: u64,
}

/// The committed graph.
///
/// Mutated only by the commit path (and recovery), always under the commit
/// gate. Readers hold it through an `Arc` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    /// Node storage: NodeId -> record
    nodes: BTreeMap<NodeId, NodeRecord>,

    /// Relationship storage: RelationshipId -> record
    relationships: BTreeMap<RelationshipId, RelationshipRecord>,

    /// Adjacency: start node -> relationships starting there
    outgoing: BTreeMap<NodeId, BTreeSet<RelationshipId>>,

    /// Adjacency: end node -> relationships ending there
    incoming: BTreeMap<NodeId, BTreeSet<RelationshipId>>,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn contains_relationship(&self, id: RelationshipId) -> bool {
        self.relationships.contains_key(&id)
    }

    /// Owned snapshot of a committed node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.get(&id).map(|record| Node {
            id,
            properties: record.properties.clone(),
        })
    }

    /// Borrow the committed properties of a node.
    #[must_use]
    pub fn node_properties(&self, id: NodeId) -> Option<&Properties> {
        self.nodes.get(&id).map(|record| &record.properties)
    }

    #[must_use]
    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id).map(|record| &record.relationship)
    }

    /// Commit sequence that last modified the node.
    #[must_use]
    pub fn node_version(&self, id: NodeId) -> Option<u64> {
        self.nodes.get(&id).map(|record| record.version)
    }

    /// Commit sequence that last modified the relationship.
    #[must_use]
    pub fn relationship_version(&self, id: RelationshipId) -> Option<u64> {
        self.relationships.get(&id).map(|record| record.version)
    }

    /// Ids of the relationships attached to `node` in `direction`, ascending.
    #[must_use]
    pub fn relationship_ids(&self, node: NodeId, direction: Direction) -> Vec<RelationshipId> {
        let empty = BTreeSet::new();
        let out = self.outgoing.get(&node).unwrap_or(&empty);
        let inc = self.incoming.get(&node).unwrap_or(&empty);
        match direction {
            Direction::Outgoing => out.iter().copied().collect(),
            Direction::Incoming => inc.iter().copied().collect(),
            Direction::Both => out.union(inc).copied().collect(),
        }
    }

    /// Number of distinct relationships attached to `node`.
    #[must_use]
    pub fn degree(&self, node: NodeId) -> usize {
        self.relationship_ids(node, Direction::Both).len()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// All relationships in ascending id order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values().map(|record| &record.relationship)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    // =========================================================================
    // MUTATION (commit path and recovery only)
    // =========================================================================

    pub(crate) fn insert_node(&mut self, id: NodeId, version: u64) -> Result<(), GraphError> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::ConsistencyViolation(format!(
                "{} already exists",
                id
            )));
        }
        self.nodes.insert(
            id,
            NodeRecord {
                properties: Properties::new(),
                version,
            },
        );
        Ok(())
    }

    pub(crate) fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::NodeNotFound(id));
        }
        if self.degree(id) > 0 {
            return Err(GraphError::ConsistencyViolation(format!(
                "{} still has {} relationship(s)",
                id,
                self.degree(id)
            )));
        }
        self.nodes.remove(&id);
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        Ok(())
    }

    pub(crate) fn set_node_property(
        &mut self,
        id: NodeId,
        key: String,
        value: PropertyValue,
        version: u64,
    ) -> Result<(), GraphError> {
        let record = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        record.properties.insert(key, value);
        record.version = version;
        Ok(())
    }

    pub(crate) fn remove_node_property(
        &mut self,
        id: NodeId,
        key: &str,
        version: u64,
    ) -> Result<(), GraphError> {
        let record = self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))?;
        record
            .properties
            .remove(key)
            .ok_or_else(|| GraphError::PropertyNotFound(key.to_string()))?;
        record.version = version;
        Ok(())
    }

    pub(crate) fn insert_relationship(
        &mut self,
        relationship: Relationship,
        version: u64,
    ) -> Result<(), GraphError> {
        let id = relationship.id;
        if self.relationships.contains_key(&id) {
            return Err(GraphError::ConsistencyViolation(format!(
                "{} already exists",
                id
            )));
        }
        for endpoint in [relationship.start, relationship.end] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(GraphError::ConsistencyViolation(format!(
                    "{} references missing {}",
                    id, endpoint
                )));
            }
        }
        self.outgoing
            .entry(relationship.start)
            .or_default()
            .insert(id);
        self.incoming.entry(relationship.end).or_default().insert(id);
        self.relationships.insert(
            id,
            RelationshipRecord {
                relationship,
                version,
            },
        );
        Ok(())
    }

    pub(crate) fn remove_relationship(&mut self, id: RelationshipId) -> Result<(), GraphError> {
        let record = self
            .relationships
            .remove(&id)
            .ok_or(GraphError::RelationshipNotFound(id))?;
        let rel = record.relationship;
        if let Some(set) = self.outgoing.get_mut(&rel.start) {
            set.remove(&id);
            if set.is_empty() {
                self.outgoing.remove(&rel.start);
            }
        }
        if let Some(set) = self.incoming.get_mut(&rel.end) {
            set.remove(&id);
            if set.is_empty() {
                self.incoming.remove(&rel.end);
            }
        }
        Ok(())
    }

    pub(crate) fn set_relationship_property(
        &mut self,
        id: RelationshipId,
        key: String,
        value: PropertyValue,
        version: u64,
    ) -> Result<(), GraphError> {
        let record = self
            .relationships
            .get_mut(&id)
            .ok_or(GraphError::RelationshipNotFound(id))?;
        record.relationship.properties.insert(key, value);
        record.version = version;
        Ok(())
    }

    pub(crate) fn remove_relationship_property(
        &mut self,
        id: RelationshipId,
        key: &str,
        version: u64,
    ) -> Result<(), GraphError> {
        let record = self
            .relationships
            .get_mut(&id)
            .ok_or(GraphError::RelationshipNotFound(id))?;
        record
            .relationship
            .properties
            .remove(key)
            .ok_or_else(|| GraphError::PropertyNotFound(key.to_string()))?;
        record.version = version;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
