//! Seed node (v1)
//!
//! A bootstrap peer for a peer-to-peer overlay network.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                        SEED NODE                          │
//!                 │                                                           │
//!   Peers ────────┼─▶ network::TcpTransport ──▶ discovery::PingDiscovery      │
//!                 │        (run / ready / stop)        │                      │
//!                 │                                    ▼                      │
//!                 │                          discovery::RoutingTable          │
//!                 │                           ▲        ▲         │            │
//!                 │        maintenance::loops │        │         ▼            │
//!                 │   refresh 10s · rebuild 10m · static 1m   api::QueryApi ──┼──▶ Operators
//!                 │                                                           │
//!                 │   lifecycle::supervisor: one task group, one cancel token │
//!                 └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Exit codes
//! - `0`: normal or interrupted shutdown
//! - `1`: invalid configuration, or a top-level task failed
//! - `130`: forced exit on a second interrupt

use clap::Parser;

use seed_node::config::cli::Cli;
use seed_node::lifecycle::{signals, supervisor, Shutdown};
use seed_node::observability::logging;
use seed_node::SeedError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(&config.observability.log_level, config.observability.json_logs) {
        eprintln!("warning: logging not initialized: {}", e);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "seed-node starting");

    let shutdown = Shutdown::new();
    signals::spawn_interrupt_listener(shutdown.clone());

    let code = match supervisor::run(config, shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            0
        }
        Err(e @ SeedError::Configuration(_)) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
        Err(e) => {
            tracing::error!(error = %e, "Seed node failed");
            eprintln!("fatal: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
