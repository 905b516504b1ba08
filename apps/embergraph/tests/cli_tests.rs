//! Tests for CLI argument parsing and command dispatch.

use clap::Parser;
use embergraph::cli::{
    Cli, Commands, DEFAULT_DATABASE, close_store, cmd_init, parse_direction, parse_value,
    property_json, run_command,
};
use embergraph_core::{Direction, GraphDatabase, GraphError, PropertyValue};
use std::path::PathBuf;
use tempfile::TempDir;

// =============================================================================
// PARSING TESTS
// =============================================================================

#[test]
fn test_demo_defaults() {
    let cli = Cli::try_parse_from(["embergraph", "demo"]).expect("parse");
    assert_eq!(
        cli.command,
        Some(Commands::Demo {
            users: 100,
            find: 45
        })
    );
    assert!(!cli.json_mode);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["embergraph", "status", "-D", "/tmp/store", "--json-mode", "-q"])
        .expect("parse");
    assert_eq!(cli.command, Some(Commands::Status));
    assert_eq!(cli.database, Some(PathBuf::from("/tmp/store")));
    assert!(cli.json_mode);
    assert!(cli.quiet);
}

#[test]
fn test_neighbors_repeated_types() {
    let cli = Cli::try_parse_from([
        "embergraph",
        "neighbors",
        "-n",
        "7",
        "--direction",
        "out",
        "--type",
        "USER",
        "--type",
        "KNOWS",
    ])
    .expect("parse");
    assert_eq!(
        cli.command,
        Some(Commands::Neighbors {
            node: 7,
            direction: "out".to_string(),
            types: vec!["USER".to_string(), "KNOWS".to_string()],
        })
    );
}

#[test]
fn test_lookup_requires_value() {
    assert!(Cli::try_parse_from(["embergraph", "lookup", "-i", "nodes", "-k", "username"]).is_err());
}

// =============================================================================
// CONFIGURATION TESTS
// =============================================================================

#[test]
fn test_default_database_path() {
    let cli = Cli::try_parse_from(["embergraph"]).expect("parse");
    let config = cli.store_config().expect("config");
    assert_eq!(config.path, Some(PathBuf::from(DEFAULT_DATABASE)));
}

#[test]
fn test_database_flag_overrides_config_file() {
    let dir = TempDir::new().expect("tempdir");
    let config_file = dir.path().join("store.toml");
    std::fs::write(
        &config_file,
        "path = \"/from/config\"\ncheckpoint_interval = 7\n",
    )
    .expect("write config");

    let cli = Cli::try_parse_from(["embergraph", "-c", config_file.to_str().expect("utf8")])
        .expect("parse");
    let config = cli.store_config().expect("config");
    assert_eq!(config.path, Some(PathBuf::from("/from/config")));
    assert_eq!(config.checkpoint_interval, 7);

    let cli = Cli::try_parse_from([
        "embergraph",
        "-c",
        config_file.to_str().expect("utf8"),
        "-D",
        "/override",
    ])
    .expect("parse");
    let config = cli.store_config().expect("config");
    assert_eq!(config.path, Some(PathBuf::from("/override")));
    assert_eq!(config.checkpoint_interval, 7);
}

#[test]
fn test_bad_config_file_is_invalid_input() {
    let dir = TempDir::new().expect("tempdir");
    let config_file = dir.path().join("store.toml");
    std::fs::write(&config_file, "no_such_field = 1\n").expect("write config");

    let cli = Cli::try_parse_from(["embergraph", "-c", config_file.to_str().expect("utf8")])
        .expect("parse");
    assert!(matches!(cli.store_config(), Err(GraphError::InvalidInput(_))));
}

// =============================================================================
// HELPER TESTS
// =============================================================================

#[test]
fn test_parse_value_types() {
    assert_eq!(parse_value("true"), PropertyValue::Boolean(true));
    assert_eq!(parse_value("-12"), PropertyValue::Integer(-12));
    assert_eq!(
        parse_value("user1@embergraph.org"),
        PropertyValue::from("user1@embergraph.org")
    );
}

#[test]
fn test_parse_direction() {
    assert_eq!(parse_direction("out").expect("out"), Direction::Outgoing);
    assert_eq!(parse_direction("incoming").expect("in"), Direction::Incoming);
    assert_eq!(parse_direction("both").expect("both"), Direction::Both);
    assert!(matches!(
        parse_direction("sideways"),
        Err(GraphError::InvalidInput(_))
    ));
}

#[test]
fn test_property_json_is_plain() {
    assert_eq!(property_json(&PropertyValue::Integer(3)), serde_json::json!(3));
    assert_eq!(
        property_json(&PropertyValue::from("a")),
        serde_json::json!("a")
    );
}

// =============================================================================
// COMMAND TESTS
// =============================================================================

#[test]
fn test_commands_against_populated_store() {
    let db = GraphDatabase::in_memory().expect("open");
    let user = db
        .execute(|tx| {
            let reference = tx.create_node()?;
            let user = tx.create_node()?;
            tx.set_node_property(user, "username", "user1@embergraph.org")?;
            tx.index_add("nodes", user, "username", "user1@embergraph.org")?;
            tx.create_relationship(reference, user, "USER")?;
            Ok(user)
        })
        .expect("seed");

    run_command(&db, Commands::Status, true).expect("status");
    run_command(
        &db,
        Commands::Lookup {
            index: "nodes".to_string(),
            key: "username".to_string(),
            value: "user1@embergraph.org".to_string(),
            as_string: false,
        },
        false,
    )
    .expect("lookup");
    run_command(
        &db,
        Commands::Neighbors {
            node: user.0,
            direction: "in".to_string(),
            types: vec!["USER".to_string()],
        },
        true,
    )
    .expect("neighbors");
}

#[test]
fn test_neighbors_of_missing_node() {
    let db = GraphDatabase::in_memory().expect("open");
    let result = run_command(
        &db,
        Commands::Neighbors {
            node: 99,
            direction: "both".to_string(),
            types: Vec::new(),
        },
        false,
    );
    assert!(matches!(result, Err(GraphError::NodeNotFound(_))));
}

#[test]
fn test_init_refuses_existing_store_without_force() {
    let dir = TempDir::new().expect("tempdir");
    let cli = Cli::try_parse_from(["embergraph", "-D", dir.path().to_str().expect("utf8")])
        .expect("parse");
    let config = cli.store_config().expect("config");

    cmd_init(&config, false, false).expect("first init");
    assert!(matches!(
        cmd_init(&config, false, false),
        Err(GraphError::InvalidInput(_))
    ));

    let db = GraphDatabase::open_with(config.clone()).expect("open");
    db.execute(|tx| tx.create_node().map(|_| ())).expect("node");
    db.close().expect("close");

    cmd_init(&config, true, true).expect("forced init");
    let db = GraphDatabase::open_with(config).expect("reopen");
    assert_eq!(db.node_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_execute_demo_then_status() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().to_str().expect("utf8").to_string();

    let cli = Cli::try_parse_from(["embergraph", "-D", &path, "-q", "demo", "-u", "20", "-f", "3"])
        .expect("parse");
    embergraph::cli::execute(cli).await.expect("demo");

    let cli = Cli::try_parse_from(["embergraph", "-D", &path, "-q", "checkpoint"]).expect("parse");
    embergraph::cli::execute(cli).await.expect("checkpoint");

    let db = GraphDatabase::open(dir.path()).expect("reopen");
    let stats = db.stats().expect("stats");
    assert_eq!(stats.node_count, 0);
    assert_eq!(stats.relationship_count, 0);
    assert_eq!(stats.pending_log_records, 0);
    assert_eq!(stats.last_sequence, 1);
}

// =============================================================================
// SHUTDOWN TESTS
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_close_store_twice_checkpoints_once() {
    let dir = TempDir::new().expect("tempdir");
    let db = GraphDatabase::open(dir.path()).expect("open");
    db.execute(|tx| tx.create_node().map(|_| ())).expect("node");

    close_store(db.clone()).await.expect("first close");
    close_store(db.clone()).await.expect("second close");
    assert!(db.is_closed());

    let reopened = GraphDatabase::open(dir.path()).expect("reopen");
    let stats = reopened.stats().expect("stats");
    assert_eq!(stats.node_count, 1);
    assert_eq!(stats.pending_log_records, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_store_waits_for_in_flight_transaction() {
    let dir = TempDir::new().expect("tempdir");
    let db = GraphDatabase::open(dir.path()).expect("open");

    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let worker = db.clone();
    let handle = std::thread::spawn(move || {
        let mut tx = worker.begin().expect("begin");
        started_tx.send(()).expect("signal");
        std::thread::sleep(std::time::Duration::from_millis(100));
        tx.create_node().expect("create");
        tx.commit()
    });
    started_rx.recv().expect("worker started");

    close_store(db.clone()).await.expect("close");
    handle.join().expect("join").expect("in-flight commit");

    let reopened = GraphDatabase::open(dir.path()).expect("reopen");
    assert_eq!(reopened.node_count(), 1);
}
