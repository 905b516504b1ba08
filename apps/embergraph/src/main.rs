//! # embergraph
//!
//! The main binary for the embergraph embedded graph store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/embergraph (THE BINARY)             │
//! │                                                          │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   │
//! │   │    CLI      │   │    Demo     │   │  ctrl-c hook │   │
//! │   │   (clap)    │   │ (users dir) │   │   (tokio)    │   │
//! │   └──────┬──────┘   └──────┬──────┘   └──────┬───────┘   │
//! │          └─────────────────┼─────────────────┘           │
//! │                            ▼                             │
//! │                  ┌──────────────────┐                    │
//! │                  │ embergraph-core  │                    │
//! │                  │ (store, WAL, tx) │                    │
//! │                  └──────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! embergraph demo --users 100 --find 45
//! embergraph status
//! embergraph lookup -i nodes -k username -v user45@embergraph.org
//! embergraph neighbors -n 0 --direction out --type USER
//! ```

use clap::Parser;
use embergraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // EMBERGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("EMBERGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "embergraph=debug,embergraph_core=debug"
    } else {
        "embergraph=info,embergraph_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  embergraph v{}
  embedded graph store: nodes, relationships, indexes, WAL
"#,
        env!("CARGO_PKG_VERSION")
    );
}
