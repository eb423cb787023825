//! # huddle-relay
//!
//! Chat relay server binary — wires the room directory, metrics recorder,
//! and WebSocket server together and runs until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_core::rooms::{InMemoryRoomDirectory, Room};
use huddle_server::config::ServerConfig;
use huddle_server::server::RelayServer;
use tracing::info;

/// Huddle chat relay server.
#[derive(Parser, Debug)]
#[command(name = "huddle-relay", about = "Huddle chat relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8374")]
    port: u16,

    /// JSON file of room records to seed the in-memory room directory.
    #[arg(long)]
    rooms: Option<PathBuf>,

    /// Heartbeat ping interval in seconds.
    #[arg(long, default_value_t = 30)]
    heartbeat_interval_secs: u64,

    /// Disconnect after this many seconds without a pong.
    #[arg(long, default_value_t = 90)]
    heartbeat_timeout_secs: u64,
}

/// Load room records from a JSON array file.
fn load_rooms(path: &Path) -> Result<Vec<Room>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rooms file: {}", path.display()))?;
    let rooms: Vec<Room> = serde_json::from_str(&text)
        .with_context(|| format!("invalid rooms file: {}", path.display()))?;
    Ok(rooms)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let directory = match &args.rooms {
        Some(path) => {
            let rooms = load_rooms(path)?;
            info!(count = rooms.len(), path = %path.display(), "seeded room directory");
            InMemoryRoomDirectory::from_rooms(rooms)
        }
        None => InMemoryRoomDirectory::new(),
    };

    let metrics = huddle_server::metrics::install_recorder();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        heartbeat_interval_secs: args.heartbeat_interval_secs,
        heartbeat_timeout_secs: args.heartbeat_timeout_secs,
        ..ServerConfig::default()
    };

    let server = RelayServer::new(config, Arc::new(directory), metrics);
    let (addr, serve_handle) = server.listen().await.context("failed to start server")?;
    info!(%addr, "huddle relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    server.shutdown().drain(vec![serve_handle], None).await;

    Ok(())
}
