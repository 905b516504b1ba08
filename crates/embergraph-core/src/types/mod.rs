//! # Core Type Definitions
//!
//! This module contains the value types shared by every layer of the store:
//! - Graph identifiers (`NodeId`, `RelationshipId`, `TransactionId`)
//! - Property data (`PropertyValue`, `Properties`)
//! - Entity snapshots handed to callers (`Node`, `Relationship`)
//! - Traversal direction and relationship type tags
//! - Transaction lifecycle states
//! - Error types (`GraphError`)
//!
//! ## Ordering Guarantees
//!
//! Every identifier and property value implements `Ord`, so all graph and
//! index state can live in `BTreeMap`/`BTreeSet` and iterate in a stable order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Unique identifier for a node.
/// Assigned monotonically by the store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Unique identifier for a relationship.
/// Assigned monotonically by the store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

/// Identifier of a transaction, unique for the lifetime of an open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel#{}", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

// =============================================================================
// RELATIONSHIP TYPE
// =============================================================================

/// Type tag of a relationship, such as `USER` or `KNOWS`.
///
/// The set of tags is open: applications usually model their own closed set as
/// an enum and convert it with `Into<RelationshipType>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipType(pub String);

impl RelationshipType {
    /// Create a new relationship type from a string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RelationshipType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RelationshipType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A scalar property value stored on a node or relationship.
///
/// The variant order defines the total order used by indexes:
/// booleans sort before integers, integers before strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl PropertyValue {
    /// Get the value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a boolean, if it is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Property map of a node or relationship, ordered by key.
pub type Properties = BTreeMap<String, PropertyValue>;

// =============================================================================
// ENTITY SNAPSHOTS
// =============================================================================

/// A node as seen by one reader at one point in time.
///
/// This is an owned copy; mutating it has no effect on the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub properties: Properties,
}

impl Node {
    /// Create a node snapshot with no properties.
    #[must_use]
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            properties: Properties::new(),
        }
    }

    /// Look up a property on this snapshot.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// A typed, directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub rel_type: RelationshipType,
    pub start: NodeId,
    pub end: NodeId,
    pub properties: Properties,
}

impl Relationship {
    /// Create a relationship with no properties.
    #[must_use]
    pub fn new(id: RelationshipId, rel_type: RelationshipType, start: NodeId, end: NodeId) -> Self {
        Self {
            id,
            rel_type,
            start,
            end,
            properties: Properties::new(),
        }
    }

    /// Given one endpoint, return the other one.
    ///
    /// Returns `None` if `node` is not an endpoint of this relationship.
    #[must_use]
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }

    /// Check whether `node` is the start or end of this relationship.
    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.start == node || self.end == node
    }

    /// Check whether this relationship matches a direction as seen from `node`.
    #[must_use]
    pub fn matches(&self, node: NodeId, direction: Direction) -> bool {
        match direction {
            Direction::Outgoing => self.start == node,
            Direction::Incoming => self.end == node,
            Direction::Both => self.touches(node),
        }
    }
}

// =============================================================================
// TRAVERSAL DIRECTION
// =============================================================================

/// Which relationships of a node a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Relationships that start at the node.
    Outgoing,
    /// Relationships that end at the node.
    Incoming,
    /// Both of the above. Self-loops are reported once.
    Both,
}

// =============================================================================
// TRANSACTION STATE
// =============================================================================

/// Lifecycle of a transaction.
///
/// `Active → Committing → Committed` on success,
/// `Active → RollingBack → RolledBack` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Active,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the embergraph store.
///
/// - No silent failures
/// - Use `Result<T, GraphError>` for fallible operations
/// - A failed commit always leaves the store exactly as it was
#[derive(Debug, Error)]
pub enum GraphError {
    /// The requested node is not visible to the caller.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The requested relationship is not visible to the caller.
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(RelationshipId),

    /// The entity exists but has no property with this key.
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// No index entry matches the request.
    #[error("No entry in index '{index}' for key '{key}'")]
    IndexEntryNotFound { index: String, key: String },

    /// A concurrent transaction touched the same entity first, or a node
    /// still has relationships attached. Retry or fix the caller.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referential integrity would be broken by the commit.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// A single-result query matched more than one entity.
    #[error("Ambiguous result: expected a single match, found {0}")]
    AmbiguousResult(usize),

    /// The calling thread already owns an active transaction.
    #[error("A transaction is already active on this thread")]
    TransactionInProgress,

    /// The transaction has already been committed or rolled back.
    #[error("Transaction is not active (state: {0:?})")]
    TransactionNotActive(TransactionState),

    /// A bounded wait expired.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The store has been closed.
    #[error("Store is closed")]
    StoreClosed,

    /// The durable representation could not be understood.
    #[error("Store corrupt: {0}")]
    StoreCorrupt(String),

    /// A caller-supplied key, value, name or type is not acceptable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl GraphError {
    /// Whether this error reports a missing node, relationship, property or
    /// index entry.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound(_)
                | Self::RelationshipNotFound(_)
                | Self::PropertyNotFound(_)
                | Self::IndexEntryNotFound { .. }
        )
    }

    /// Whether the caller may reasonably retry the whole transaction.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Timeout(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
