//! # Index Manager
//!
//! Named secondary indexes over nodes. Each index maps an exact
//! `(key, value)` pair to the set of nodes a caller explicitly registered
//! under it. Entries are never derived from node properties: setting a
//! property does not index it, and removing one does not unindex it.
//!
//! An index comes into existence on its first committed `add` and is kept
//! for the life of the store, even when it becomes empty. Looking up an
//! unknown index behaves like looking up an empty one.

use crate::{GraphError, NodeId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One `(index, node, key, value)` registration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    pub index: String,
    pub node: NodeId,
    pub key: String,
    pub value: PropertyValue,
}

impl IndexEntry {
    #[must_use]
    pub fn new(
        index: impl Into<String>,
        node: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self {
            index: index.into(),
            node,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether this entry answers a lookup of `(index, key, value)`.
    #[must_use]
    pub fn matches(&self, index: &str, key: &str, value: &PropertyValue) -> bool {
        self.index == index && self.key == key && &self.value == value
    }
}

// =============================================================================
// NODE INDEX
// =============================================================================

/// A single named index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIndex {
    /// (key, value) -> nodes
    entries: BTreeMap<(String, PropertyValue), BTreeSet<NodeId>>,
    /// node -> (key, value) pairs, for removal by node
    by_node: BTreeMap<NodeId, BTreeSet<(String, PropertyValue)>>,
}

impl NodeIndex {
    fn insert(&mut self, node: NodeId, key: String, value: PropertyValue) -> bool {
        let added = self
            .entries
            .entry((key.clone(), value.clone()))
            .or_default()
            .insert(node);
        self.by_node.entry(node).or_default().insert((key, value));
        added
    }

    fn remove(&mut self, node: NodeId, key: &str, value: &PropertyValue) -> bool {
        let pair = (key.to_string(), value.clone());
        let removed = match self.entries.get_mut(&pair) {
            Some(nodes) => {
                let removed = nodes.remove(&node);
                if nodes.is_empty() {
                    self.entries.remove(&pair);
                }
                removed
            }
            None => false,
        };
        if let Some(pairs) = self.by_node.get_mut(&node) {
            pairs.remove(&pair);
            if pairs.is_empty() {
                self.by_node.remove(&node);
            }
        }
        removed
    }

    fn get(&self, key: &str, value: &PropertyValue) -> Vec<NodeId> {
        self.entries
            .get(&(key.to_string(), value.clone()))
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    fn pairs_for(&self, node: NodeId) -> Vec<(String, PropertyValue)> {
        self.by_node
            .get(&node)
            .map(|pairs| pairs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `(node, key, value)` registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// INDEX MANAGER
// =============================================================================

/// All named indexes of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManager {
    indexes: BTreeMap<String, NodeIndex>,
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` under `(key, value)` in `index`, creating the index if
    /// needed. Returns `false` if the entry was already present.
    pub fn add(&mut self, entry: IndexEntry) -> bool {
        self.indexes
            .entry(entry.index)
            .or_default()
            .insert(entry.node, entry.key, entry.value)
    }

    /// Remove one exact entry. Returns `false` if it was absent.
    pub fn remove(&mut self, entry: &IndexEntry) -> bool {
        self.indexes
            .get_mut(&entry.index)
            .is_some_and(|index| index.remove(entry.node, &entry.key, &entry.value))
    }

    /// Check whether one exact entry is present.
    #[must_use]
    pub fn contains(&self, entry: &IndexEntry) -> bool {
        self.indexes.get(&entry.index).is_some_and(|index| {
            index
                .entries
                .get(&(entry.key.clone(), entry.value.clone()))
                .is_some_and(|nodes| nodes.contains(&entry.node))
        })
    }

    /// Nodes registered under `(key, value)` in `index`, ascending.
    #[must_use]
    pub fn get(&self, index: &str, key: &str, value: &PropertyValue) -> Vec<NodeId> {
        self.indexes
            .get(index)
            .map(|idx| idx.get(key, value))
            .unwrap_or_default()
    }

    /// Every entry of `index` that references `node`.
    #[must_use]
    pub fn entries_for(&self, index: &str, node: NodeId) -> Vec<IndexEntry> {
        self.indexes
            .get(index)
            .map(|idx| {
                idx.pairs_for(node)
                    .into_iter()
                    .map(|(key, value)| IndexEntry {
                        index: index.to_string(),
                        node,
                        key,
                        value,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every entry referencing `node` from every index.
    /// Returns the number of entries removed.
    pub fn purge_node(&mut self, node: NodeId) -> usize {
        let mut removed = 0;
        for index in self.indexes.values_mut() {
            for (key, value) in index.pairs_for(node) {
                if index.remove(node, &key, &value) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Names of all indexes, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Entry count of one index (0 if unknown).
    #[must_use]
    pub fn entry_count(&self, index: &str) -> usize {
        self.indexes.get(index).map_or(0, NodeIndex::len)
    }

    /// Entry count across all indexes.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.indexes.values().map(NodeIndex::len).sum()
    }
}

// =============================================================================
// INDEX HITS
// =============================================================================

/// Result of an index lookup: a finite sequence of node ids that can be
/// iterated any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHits {
    index: String,
    key: String,
    nodes: Vec<NodeId>,
}

impl IndexHits {
    #[must_use]
    pub fn new(index: impl Into<String>, key: impl Into<String>, nodes: Vec<NodeId>) -> Self {
        Self {
            index: index.into(),
            key: key.into(),
            nodes,
        }
    }

    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, NodeId>> {
        self.nodes.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The only hit.
    ///
    /// # Errors
    ///
    /// `IndexEntryNotFound` when there are no hits, `AmbiguousResult(n)` when
    /// there are `n > 1`.
    pub fn single(&self) -> Result<NodeId, GraphError> {
        match self.nodes.as_slice() {
            [] => Err(GraphError::IndexEntryNotFound {
                index: self.index.clone(),
                key: self.key.clone(),
            }),
            [node] => Ok(*node),
            many => Err(GraphError::AmbiguousResult(many.len())),
        }
    }

    /// Like [`IndexHits::single`], but an empty result is `Ok(None)`.
    pub fn single_or_none(&self) -> Result<Option<NodeId>, GraphError> {
        match self.nodes.as_slice() {
            [] => Ok(None),
            [node] => Ok(Some(*node)),
            many => Err(GraphError::AmbiguousResult(many.len())),
        }
    }
}

impl IntoIterator for IndexHits {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a IndexHits {
    type Item = NodeId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, NodeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================
