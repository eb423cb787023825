//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound send channel.
    pub send_buffer: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 64 * 1024, // 64 KiB — chat payloads are small
            send_buffer: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}
