//! # User Directory Demo
//!
//! The classic embedded-store walkthrough, run inside one transaction:
//!
//! 1. create a users reference node, tagged `reference = "users"` and
//!    registered in the `references` index
//! 2. create N users with a `username`, index each one in `nodes` and link it
//!    from the reference node with a `USER` relationship
//! 3. find one user through the `nodes` index
//! 4. tear everything down again: relationship, index entry, then node
//!
//! The store ends the run exactly where it started.

use embergraph_core::{
    Direction, GraphDatabase, GraphError, GraphRead, NodeId, PropertyValue, RelationshipType,
    Transaction,
};
use serde::Serialize;
use tracing::{debug, info};

// =============================================================================
// NAMES
// =============================================================================

/// Property holding a user's login name.
pub const USERNAME_KEY: &str = "username";

/// Index of users by username.
pub const USER_INDEX: &str = "nodes";

/// Index of reference (anchor) nodes.
pub const REFERENCE_INDEX: &str = "references";

/// Property and index key marking a reference node.
pub const REFERENCE_KEY: &str = "reference";

/// Value of `REFERENCE_KEY` on the users reference node.
pub const USERS_REFERENCE: &str = "users";

/// Relationship types used by the demo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelTypes {
    /// Reference node to user.
    User,
}

impl RelTypes {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "USER",
        }
    }
}

impl From<RelTypes> for RelationshipType {
    fn from(rel: RelTypes) -> Self {
        RelationshipType::new(rel.name())
    }
}

/// Username for the user with the given number.
#[must_use]
pub fn id_to_username(id: usize) -> String {
    format!("user{}@embergraph.org", id)
}

// =============================================================================
// REPORT
// =============================================================================

/// What one demo run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    pub users_created: usize,
    pub find: usize,
    pub found_node: NodeId,
    pub found_username: String,
    pub users_deleted: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub relationships_before: usize,
    pub relationships_after: usize,
}

impl DemoReport {
    /// True if the run left node and relationship counts unchanged.
    #[must_use]
    pub fn restored_baseline(&self) -> bool {
        self.nodes_before == self.nodes_after
            && self.relationships_before == self.relationships_after
    }
}

// =============================================================================
// RUN
// =============================================================================

/// Run the user directory demo against `db`.
///
/// `find` must name one of the created users. The whole run is one
/// transaction; on any error it is rolled back and nothing is committed.
pub fn run_user_directory_demo(
    db: &GraphDatabase,
    users: usize,
    find: usize,
) -> Result<DemoReport, GraphError> {
    if find >= users {
        return Err(GraphError::InvalidInput(format!(
            "Cannot find user {} among {} users",
            find, users
        )));
    }

    let nodes_before = db.node_count();
    let relationships_before = db.relationship_count();

    let mut tx = db.begin()?;
    let outcome = populate_find_and_remove(&mut tx, users, find);
    if outcome.is_ok() {
        tx.success()?;
    }
    // Commits when marked, rolls back otherwise.
    tx.finish()?;
    let (found_node, found_username, users_deleted) = outcome?;

    let report = DemoReport {
        users_created: users,
        find,
        found_node,
        found_username,
        users_deleted,
        nodes_before,
        nodes_after: db.node_count(),
        relationships_before,
        relationships_after: db.relationship_count(),
    };
    info!(
        users = report.users_created,
        deleted = report.users_deleted,
        "User directory demo committed"
    );
    Ok(report)
}

fn populate_find_and_remove(
    tx: &mut Transaction,
    users: usize,
    find: usize,
) -> Result<(NodeId, String, usize), GraphError> {
    let reference = tx.create_node()?;
    tx.set_node_property(reference, REFERENCE_KEY, USERS_REFERENCE)?;
    tx.index_add(REFERENCE_INDEX, reference, REFERENCE_KEY, USERS_REFERENCE)?;

    for id in 0..users {
        let user = create_and_index_user(tx, &id_to_username(id))?;
        tx.create_relationship(reference, user, RelTypes::User)?;
    }
    debug!(users, staged = tx.pending_mutations(), "Users created");

    let found_node = tx
        .index_get(
            USER_INDEX,
            USERNAME_KEY,
            &PropertyValue::from(id_to_username(find)),
        )
        .single()?;
    let found_username = username_of(tx, found_node)?;

    let rels = tx.relationships(
        reference,
        Direction::Outgoing,
        &[RelationshipType::from(RelTypes::User)],
    )?;
    for rel in &rels {
        let user = rel.end;
        let name = tx.node_property(user, USERNAME_KEY)?;
        tx.delete_relationship(rel.id)?;
        tx.index_remove(USER_INDEX, user, USERNAME_KEY, name)?;
        tx.delete_node(user)?;
    }
    tx.index_remove_node(REFERENCE_INDEX, reference)?;
    tx.delete_node(reference)?;

    Ok((found_node, found_username, rels.len()))
}

fn create_and_index_user(tx: &mut Transaction, username: &str) -> Result<NodeId, GraphError> {
    let node = tx.create_node()?;
    tx.set_node_property(node, USERNAME_KEY, username)?;
    tx.index_add(USER_INDEX, node, USERNAME_KEY, username)?;
    Ok(node)
}

fn username_of(tx: &Transaction, node: NodeId) -> Result<String, GraphError> {
    let user = tx.node(node)?;
    user.property(USERNAME_KEY)
        .and_then(PropertyValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| GraphError::PropertyNotFound(USERNAME_KEY.to_string()))
}
