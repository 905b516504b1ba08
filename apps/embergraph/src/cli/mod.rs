//! # embergraph CLI Module
//!
//! This module implements the CLI interface for embergraph.
//!
//! ## Available Commands
//!
//! - `demo` - Run the user directory walkthrough
//! - `status` - Show store statistics
//! - `lookup` - Query a node index
//! - `neighbors` - List the relationships of a node
//! - `checkpoint` - Fold the write-ahead log into a snapshot
//! - `init` - Initialize a new empty store

mod commands;

use clap::{Parser, Subcommand};
use embergraph_core::{GraphDatabase, GraphError, StoreConfig};
use std::path::PathBuf;
use tracing::{info, warn};

pub use commands::*;

/// Store directory used when neither `--database` nor the config names one.
pub const DEFAULT_DATABASE: &str = "embergraph-store";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// embergraph - embedded transactional graph store
///
/// Nodes, typed relationships, named node indexes and a durable
/// write-ahead log in a single directory.
#[derive(Parser, Debug)]
#[command(name = "embergraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the store directory [default: embergraph-store]
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// TOML store configuration; --database overrides its path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Create users, find one by index, then delete them all again
    Demo {
        /// Number of users to create
        #[arg(short, long, default_value = "100")]
        users: usize,

        /// Number of the user to look up
        #[arg(short, long, default_value = "45")]
        find: usize,
    },

    /// Show store statistics
    Status,

    /// Look up nodes in a named index
    Lookup {
        /// Index name
        #[arg(short, long)]
        index: String,

        /// Entry key
        #[arg(short, long)]
        key: String,

        /// Entry value; `true`/`false` and integers are typed unless --as-string
        #[arg(short, long)]
        value: String,

        /// Always treat the value as a string
        #[arg(long)]
        as_string: bool,
    },

    /// List the relationships of a node
    Neighbors {
        /// Node ID
        #[arg(short, long)]
        node: u64,

        /// Direction (out, in, both)
        #[arg(short, long, default_value = "both")]
        direction: String,

        /// Relationship type filter (repeatable)
        #[arg(short = 't', long = "type")]
        types: Vec<String>,
    },

    /// Fold the write-ahead log into a snapshot
    Checkpoint,

    /// Initialize a new empty store
    Init {
        /// Force initialization even if the store exists
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Resolve the store configuration from `--config` and `--database`.
    pub fn store_config(&self) -> Result<StoreConfig, GraphError> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::from_file(path)?,
            None => StoreConfig::default(),
        };
        if let Some(database) = &self.database {
            config.path = Some(database.clone());
        }
        if config.path.is_none() {
            config.path = Some(PathBuf::from(DEFAULT_DATABASE));
        }
        Ok(config)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
///
/// Store work runs on a blocking thread, since transactions are bound to the
/// thread that began them. A signal task closes the store on ctrl-c or
/// SIGTERM and exits; the normal path closes it too, and the second close is
/// a no-op.
pub async fn execute(cli: Cli) -> Result<(), GraphError> {
    let config = cli.store_config()?;
    let json_mode = cli.json_mode;
    let command = cli.command.unwrap_or(Commands::Status);

    if let Commands::Init { force } = command {
        return cmd_init(&config, force, json_mode);
    }

    let db = GraphDatabase::open_with(config)?;
    let shutdown = tokio::spawn(close_on_termination(db.clone()));

    let worker = db.clone();
    let result = tokio::task::spawn_blocking(move || run_command(&worker, command, json_mode))
        .await
        .map_err(|e| GraphError::IoError(format!("Command task failed: {}", e)))?;

    shutdown.abort();
    let closed = close_store(db).await;
    result.and(closed)
}

/// Dispatch a command that needs an open store.
pub fn run_command(db: &GraphDatabase, command: Commands, json_mode: bool) -> Result<(), GraphError> {
    match command {
        Commands::Demo { users, find } => cmd_demo(db, users, find, json_mode),
        Commands::Status => cmd_status(db, json_mode),
        Commands::Lookup {
            index,
            key,
            value,
            as_string,
        } => cmd_lookup(db, &index, &key, &value, as_string, json_mode),
        Commands::Neighbors {
            node,
            direction,
            types,
        } => cmd_neighbors(db, node, &direction, &types, json_mode),
        Commands::Checkpoint => cmd_checkpoint(db, json_mode),
        Commands::Init { .. } => Err(GraphError::InvalidInput(
            "init runs without an open store".to_string(),
        )),
    }
}

// =============================================================================
// SHUTDOWN
// =============================================================================

/// Close the store on a blocking thread.
///
/// `close()` waits for in-flight transactions, so it must not run on an async
/// worker. Both the signal task and the normal exit path go through here.
pub async fn close_store(db: GraphDatabase) -> Result<(), GraphError> {
    tokio::task::spawn_blocking(move || db.close())
        .await
        .map_err(|e| GraphError::IoError(format!("Close task failed: {}", e)))?
}

/// Resolve on the first termination request: ctrl-c, or SIGTERM on unix.
pub async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

async fn close_on_termination(db: GraphDatabase) {
    if let Err(e) = termination_signal().await {
        warn!("Cannot listen for termination signals: {}", e);
        return;
    }
    info!("Termination signal received, shutting down store ...");
    match close_store(db).await {
        Ok(()) => std::process::exit(130),
        Err(e) => warn!("Close on termination failed: {}", e),
    }
    std::process::exit(1);
}
