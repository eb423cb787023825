//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Handshakes rejected before join (counter, labels: cause).
pub const WS_HANDSHAKES_REJECTED_TOTAL: &str = "ws_handshakes_rejected_total";
/// Connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Broadcast publishes total (counter).
pub const CHAT_BROADCASTS_TOTAL: &str = "chat_broadcasts_total";
/// Per-member deliveries dropped during fan-out (counter).
pub const CHAT_BROADCAST_DROPS_TOTAL: &str = "chat_broadcast_drops_total";
/// Chat messages relayed total (counter).
pub const CHAT_MESSAGES_TOTAL: &str = "chat_messages_total";
/// Inbound payloads that fell back to raw text (counter).
pub const CHAT_PAYLOAD_FALLBACKS_TOTAL: &str = "chat_payload_fallbacks_total";
/// Inbound payloads dropped for an unrecognized kind (counter).
pub const CHAT_UNRECOGNIZED_KINDS_TOTAL: &str = "chat_unrecognized_kinds_total";
