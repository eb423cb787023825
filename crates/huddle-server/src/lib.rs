//! # huddle-server
//!
//! Axum HTTP + `WebSocket` relay server.
//!
//! - HTTP endpoints: health check, Prometheus metrics
//! - `WebSocket` gateway: handshake (identity + room resolution), group
//!   registry, broadcast fan-out, per-connection session loops, heartbeat
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
