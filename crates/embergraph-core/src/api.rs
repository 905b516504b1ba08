//! # Graph API: Write Operations
//!
//! Mutating operations of a `Transaction`. Each one checks its input and the
//! transaction's current view synchronously, records the change in the
//! overlay, and appends a `Mutation` for the commit record. Nothing becomes
//! visible outside the transaction until it commits.

use crate::graph::GraphRead;
use crate::index::IndexEntry;
use crate::mutation::Mutation;
use crate::primitives::{MAX_KEY_LENGTH, MAX_NAME_LENGTH, MAX_STRING_VALUE_LENGTH};
use crate::transaction::Transaction;
use crate::{
    Direction, GraphError, NodeId, PropertyValue, Relationship, RelationshipId, RelationshipType,
};

// =============================================================================
// INPUT VALIDATION
// =============================================================================

fn validate_key(key: &str) -> Result<(), GraphError> {
    if key.is_empty() {
        return Err(GraphError::InvalidInput(
            "property key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(GraphError::InvalidInput(format!(
            "property key of {} bytes exceeds {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn validate_value(value: &PropertyValue) -> Result<(), GraphError> {
    match value {
        PropertyValue::String(s) if s.len() > MAX_STRING_VALUE_LENGTH => {
            Err(GraphError::InvalidInput(format!(
                "string value of {} bytes exceeds {}",
                s.len(),
                MAX_STRING_VALUE_LENGTH
            )))
        }
        _ => Ok(()),
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), GraphError> {
    if name.is_empty() {
        return Err(GraphError::InvalidInput(format!("{} must not be empty", kind)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(GraphError::InvalidInput(format!(
            "{} of {} bytes exceeds {}",
            kind,
            name.len(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

impl Transaction {
    // =========================================================================
    // NODES
    // =========================================================================

    /// Create a node with no properties.
    pub fn create_node(&mut self) -> Result<NodeId, GraphError> {
        self.ensure_active()?;
        let id = self.coordinator().allocate_node_id();
        self.overlay.created_nodes.insert(id);
        self.overlay.mutations.push(Mutation::CreateNode { node: id });
        Ok(id)
    }

    /// Delete a node.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if the node is not visible, `Conflict` if relationships
    /// are still attached to it in this transaction's view.
    pub fn delete_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let attached = self.relationships(id, Direction::Both, &[])?.len();
        if attached > 0 {
            return Err(GraphError::Conflict(format!(
                "{} still has {} relationship(s)",
                id, attached
            )));
        }
        self.overlay.deleted_nodes.insert(id);
        self.overlay.mutations.push(Mutation::DeleteNode { node: id });
        Ok(())
    }

    /// Set (or overwrite) a node property.
    pub fn set_node_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), GraphError> {
        self.ensure_active()?;
        let value = value.into();
        validate_key(key)?;
        validate_value(&value)?;
        if !self.node_visible(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        self.overlay
            .node_props
            .entry(id)
            .or_default()
            .insert(key.to_string(), Some(value.clone()));
        self.overlay.mutations.push(Mutation::SetNodeProperty {
            node: id,
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Remove a node property, returning its previous value.
    pub fn remove_node_property(
        &mut self,
        id: NodeId,
        key: &str,
    ) -> Result<PropertyValue, GraphError> {
        let previous = self.node_property(id, key)?;
        self.overlay
            .node_props
            .entry(id)
            .or_default()
            .insert(key.to_string(), None);
        self.overlay.mutations.push(Mutation::RemoveNodeProperty {
            node: id,
            key: key.to_string(),
        });
        Ok(previous)
    }

    // =========================================================================
    // RELATIONSHIPS
    // =========================================================================

    /// Create a directed relationship `from -> to`.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if either endpoint is not visible in this transaction.
    pub fn create_relationship(
        &mut self,
        from: NodeId,
        to: NodeId,
        rel_type: impl Into<RelationshipType>,
    ) -> Result<RelationshipId, GraphError> {
        self.ensure_active()?;
        let rel_type = rel_type.into();
        validate_name("relationship type", rel_type.as_str())?;
        for endpoint in [from, to] {
            if !self.node_visible(endpoint) {
                return Err(GraphError::NodeNotFound(endpoint));
            }
        }

        let id = self.coordinator().allocate_relationship_id();
        self.overlay
            .created_relationships
            .insert(id, Relationship::new(id, rel_type.clone(), from, to));
        self.overlay.mutations.push(Mutation::CreateRelationship {
            relationship: id,
            rel_type,
            start: from,
            end: to,
        });
        Ok(id)
    }

    pub fn delete_relationship(&mut self, id: RelationshipId) -> Result<(), GraphError> {
        self.ensure_active()?;
        if !self.relationship_visible(id) {
            return Err(GraphError::RelationshipNotFound(id));
        }
        self.overlay.deleted_relationships.insert(id);
        self.overlay
            .mutations
            .push(Mutation::DeleteRelationship { relationship: id });
        Ok(())
    }

    pub fn set_relationship_property(
        &mut self,
        id: RelationshipId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), GraphError> {
        self.ensure_active()?;
        let value = value.into();
        validate_key(key)?;
        validate_value(&value)?;
        if !self.relationship_visible(id) {
            return Err(GraphError::RelationshipNotFound(id));
        }
        self.overlay
            .relationship_props
            .entry(id)
            .or_default()
            .insert(key.to_string(), Some(value.clone()));
        self.overlay.mutations.push(Mutation::SetRelationshipProperty {
            relationship: id,
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Remove a relationship property, returning its previous value.
    pub fn remove_relationship_property(
        &mut self,
        id: RelationshipId,
        key: &str,
    ) -> Result<PropertyValue, GraphError> {
        let previous = self.relationship_property(id, key)?;
        self.overlay
            .relationship_props
            .entry(id)
            .or_default()
            .insert(key.to_string(), None);
        self.overlay
            .mutations
            .push(Mutation::RemoveRelationshipProperty {
                relationship: id,
                key: key.to_string(),
            });
        Ok(previous)
    }

    // =========================================================================
    // INDEXES
    // =========================================================================

    /// Register `node` under `(key, value)` in the named index.
    ///
    /// The node's properties are not consulted. Adding an entry that already
    /// exists is a no-op.
    pub fn index_add(
        &mut self,
        index: &str,
        node: NodeId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), GraphError> {
        self.ensure_active()?;
        let value = value.into();
        validate_name("index name", index)?;
        validate_key(key)?;
        validate_value(&value)?;
        if !self.node_visible(node) {
            return Err(GraphError::NodeNotFound(node));
        }

        let entry = IndexEntry::new(index, node, key, value);
        self.overlay.index_removed.remove(&entry);
        if !self.snapshot().indexes.contains(&entry) {
            self.overlay.index_added.insert(entry.clone());
        }
        self.overlay.mutations.push(Mutation::IndexAdd {
            index: entry.index,
            node,
            key: entry.key,
            value: entry.value,
        });
        Ok(())
    }

    /// Remove one exact entry from the named index.
    ///
    /// # Errors
    ///
    /// `IndexEntryNotFound` if the entry is not visible in this transaction.
    pub fn index_remove(
        &mut self,
        index: &str,
        node: NodeId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), GraphError> {
        self.ensure_active()?;
        let entry = IndexEntry::new(index, node, key, value);
        if !self.index_entry_visible(&entry) {
            return Err(GraphError::IndexEntryNotFound {
                index: index.to_string(),
                key: key.to_string(),
            });
        }
        self.stage_index_remove(entry);
        Ok(())
    }

    /// Remove every entry of `node` from the named index.
    /// Returns how many entries were removed.
    pub fn index_remove_node(&mut self, index: &str, node: NodeId) -> Result<usize, GraphError> {
        self.ensure_active()?;
        let entries = self.index_entries_for(index, node);
        let removed = entries.len();
        for entry in entries {
            self.stage_index_remove(entry);
        }
        Ok(removed)
    }

    /// Remove every entry of `node` under `key` from the named index.
    /// Returns how many entries were removed.
    pub fn index_remove_key(
        &mut self,
        index: &str,
        node: NodeId,
        key: &str,
    ) -> Result<usize, GraphError> {
        self.ensure_active()?;
        let entries: Vec<IndexEntry> = self
            .index_entries_for(index, node)
            .into_iter()
            .filter(|e| e.key == key)
            .collect();
        let removed = entries.len();
        for entry in entries {
            self.stage_index_remove(entry);
        }
        Ok(removed)
    }

    fn stage_index_remove(&mut self, entry: IndexEntry) {
        self.overlay.index_added.remove(&entry);
        if self.snapshot().indexes.contains(&entry) {
            self.overlay.index_removed.insert(entry.clone());
        }
        self.overlay.mutations.push(Mutation::IndexRemove {
            index: entry.index,
            node: entry.node,
            key: entry.key,
            value: entry.value,
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
