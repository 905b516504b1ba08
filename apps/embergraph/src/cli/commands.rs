//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::demo::run_user_directory_demo;
use embergraph_core::{
    Direction, GraphDatabase, GraphError, GraphRead, NodeId, PropertyValue, RelationshipType,
    StoreConfig, primitives::STORE_FILE_NAME,
};
use serde_json::{Map, Value};

// =============================================================================
// DEMO COMMAND
// =============================================================================

/// Run the user directory demo.
pub fn cmd_demo(
    db: &GraphDatabase,
    users: usize,
    find: usize,
    json_mode: bool,
) -> Result<(), GraphError> {
    tracing::info!("Running user directory demo with {} users", users);
    let report = run_user_directory_demo(db, users, find)?;

    if json_mode {
        print_json(&serde_json::to_value(&report).unwrap_or_default());
        return Ok(());
    }

    println!("Users created: {}", report.users_created);
    println!(
        "The username of user {} is {}",
        report.find, report.found_username
    );
    println!("Users deleted: {}", report.users_deleted);
    println!(
        "Nodes: {} -> {}, Relationships: {} -> {}",
        report.nodes_before,
        report.nodes_after,
        report.relationships_before,
        report.relationships_after
    );
    println!("Shutting down database ...");

    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store statistics.
pub fn cmd_status(db: &GraphDatabase, json_mode: bool) -> Result<(), GraphError> {
    let stats = db.stats()?;
    let location = db
        .config()
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in memory)".to_string());

    if json_mode {
        let mut output = serde_json::to_value(&stats).unwrap_or_default();
        if let Value::Object(map) = &mut output {
            map.insert("database".to_string(), Value::String(location));
        }
        print_json(&output);
        return Ok(());
    }

    println!("embergraph Store Status");
    println!("=======================");
    println!("Database: {}", location);
    println!();
    println!("Nodes:           {}", stats.node_count);
    println!("Relationships:   {}", stats.relationship_count);
    println!("Last Sequence:   {}", stats.last_sequence);
    println!("Pending Records: {}", stats.pending_log_records);
    if stats.indexes.is_empty() {
        println!("Indexes:         (none)");
    } else {
        println!("Indexes:");
        for (name, entries) in &stats.indexes {
            println!("  {:<16} {} entries", name, entries);
        }
    }

    Ok(())
}

// =============================================================================
// LOOKUP COMMAND
// =============================================================================

/// Look up nodes in a named index and print their properties.
pub fn cmd_lookup(
    db: &GraphDatabase,
    index: &str,
    key: &str,
    value: &str,
    as_string: bool,
    json_mode: bool,
) -> Result<(), GraphError> {
    let value = if as_string {
        PropertyValue::from(value)
    } else {
        parse_value(value)
    };

    let snapshot = db.snapshot();
    let hits = snapshot.index_get(index, key, &value);
    let nodes = hits
        .iter()
        .map(|id| snapshot.node(id))
        .collect::<Result<Vec<_>, _>>()?;

    if json_mode {
        let output = serde_json::json!({
            "index": index,
            "key": key,
            "value": property_json(&value),
            "nodes": nodes
                .iter()
                .map(|node| serde_json::json!({
                    "id": node.id.0,
                    "properties": properties_json(node.properties.iter()),
                }))
                .collect::<Vec<_>>(),
        });
        print_json(&output);
        return Ok(());
    }

    if nodes.is_empty() {
        println!("No entries for {}={} in index '{}'", key, value, index);
        return Ok(());
    }
    println!("{} hit(s) for {}={} in index '{}':", nodes.len(), key, value, index);
    for node in &nodes {
        println!("  node {}", node.id);
        for (k, v) in &node.properties {
            println!("    {} = {}", k, v);
        }
    }

    Ok(())
}

// =============================================================================
// NEIGHBORS COMMAND
// =============================================================================

/// List the relationships of a node.
pub fn cmd_neighbors(
    db: &GraphDatabase,
    node: u64,
    direction: &str,
    types: &[String],
    json_mode: bool,
) -> Result<(), GraphError> {
    let node = NodeId(node);
    let direction = parse_direction(direction)?;
    let types: Vec<RelationshipType> = types.iter().map(RelationshipType::new).collect();

    let snapshot = db.snapshot();
    let rels = snapshot.relationships(node, direction, &types)?;

    if json_mode {
        let output = serde_json::json!({
            "node": node.0,
            "relationships": rels
                .iter()
                .map(|rel| serde_json::json!({
                    "id": rel.id.0,
                    "type": rel.rel_type.as_str(),
                    "start": rel.start.0,
                    "end": rel.end.0,
                    "other": rel.other_node(node).map(|n| n.0),
                    "properties": properties_json(rel.properties.iter()),
                }))
                .collect::<Vec<_>>(),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Node {}: {} relationship(s)", node, rels.len());
    for rel in &rels {
        let arrow = if rel.start == node { "->" } else { "<-" };
        let other = rel.other_node(node).unwrap_or(node);
        println!("  [{}] {} {} {}", rel.id, rel.rel_type, arrow, other);
    }

    Ok(())
}

// =============================================================================
// CHECKPOINT COMMAND
// =============================================================================

/// Fold the write-ahead log into a snapshot.
pub fn cmd_checkpoint(db: &GraphDatabase, json_mode: bool) -> Result<(), GraphError> {
    let folded = db.checkpoint()?;
    let sequence = db.snapshot().sequence();

    if json_mode {
        print_json(&serde_json::json!({
            "checkpoint_sequence": sequence,
            "records_folded": folded,
        }));
    } else {
        println!(
            "Checkpoint written at sequence {} ({} log records folded)",
            sequence, folded
        );
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty store.
pub fn cmd_init(config: &StoreConfig, force: bool, json_mode: bool) -> Result<(), GraphError> {
    let dir = config
        .path
        .clone()
        .ok_or_else(|| GraphError::InvalidInput("init needs a store path".to_string()))?;
    let file = dir.join(STORE_FILE_NAME);

    if file.exists() {
        if !force {
            return Err(GraphError::InvalidInput(
                "Store already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&file).map_err(|e| {
            GraphError::IoError(format!("Cannot remove '{}': {}", file.display(), e))
        })?;
        tracing::warn!("Removed existing store at {}", file.display());
    }

    let db = GraphDatabase::open_with(config.clone())?;
    db.close()?;

    if json_mode {
        print_json(&serde_json::json!({ "initialized": dir.display().to_string() }));
    } else {
        println!("Initialized new store at {}", dir.display());
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Parse a command-line value: `true`/`false`, then integers, then strings.
pub fn parse_value(raw: &str) -> PropertyValue {
    match raw {
        "true" => PropertyValue::Boolean(true),
        "false" => PropertyValue::Boolean(false),
        _ => raw
            .parse::<i64>()
            .map(PropertyValue::Integer)
            .unwrap_or_else(|_| PropertyValue::from(raw)),
    }
}

/// Parse a traversal direction name.
pub fn parse_direction(raw: &str) -> Result<Direction, GraphError> {
    match raw {
        "out" | "outgoing" => Ok(Direction::Outgoing),
        "in" | "incoming" => Ok(Direction::Incoming),
        "both" => Ok(Direction::Both),
        other => Err(GraphError::InvalidInput(format!(
            "Unknown direction '{}' (expected out, in or both)",
            other
        ))),
    }
}

/// Plain JSON rendering of a property value.
pub fn property_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::Integer(i) => Value::from(*i),
        PropertyValue::String(s) => Value::String(s.clone()),
    }
}

fn properties_json<'a>(props: impl Iterator<Item = (&'a String, &'a PropertyValue)>) -> Value {
    Value::Object(
        props
            .map(|(k, v)| (k.clone(), property_json(v)))
            .collect::<Map<String, Value>>(),
    )
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
