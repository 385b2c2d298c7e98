//! Row Feed Coordinator Service
//!
//! Reference coordination service for distributed load-test runs. It owns
//! one cursor per execution and dataset and hands out row indices to every
//! client in the fleet, so rows are not repeated until the dataset wraps.
//!
//! Cursors are kept in memory and are lost on restart. Run one coordinator
//! per test run, or send `DELETE /executions/{id}` when an execution ends.
//!
//! # Usage
//!
//! ```bash
//! # Start coordinator with default settings
//! feed-coordinator
//!
//! # Custom port, requiring clients to send a key
//! feed-coordinator --port 9090 --key s3cret
//! ```

mod service;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use state::CursorState;

/// Row Feed Coordinator
#[derive(Parser, Debug)]
#[command(name = "feed-coordinator")]
#[command(about = "Coordination service handing out fleet-wide row cursors")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    address: String,

    /// Key clients must send as the `key` query parameter
    #[arg(short, long)]
    key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Row Feed Coordinator");
    tracing::info!("  Authentication: {}", if args.key.is_some() { "key" } else { "none" });

    let state = Arc::new(CursorState::new(args.key));
    let app = service::router(state);

    let addr: SocketAddr = format!("{}:{}", args.address, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for CTRL+C: {}", e);
        return;
    }
    tracing::info!("Shutting down coordinator...");
}
