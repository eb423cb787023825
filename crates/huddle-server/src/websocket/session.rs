//! WebSocket session lifecycle — one connected client from handshake
//! outcome through join, relay, and teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use huddle_core::events::{decode_inbound, BroadcastEvent, InboundPayload};
use huddle_core::{HandshakeError, Identity};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::dispatch::Dispatcher;
use super::registry::GroupRegistry;
use crate::config::ServerConfig;
use crate::metrics::{
    CHAT_MESSAGES_TOTAL, CHAT_PAYLOAD_FALLBACKS_TOTAL, CHAT_UNRECOGNIZED_KINDS_TOTAL,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL, WS_HANDSHAKES_REJECTED_TOTAL,
};

/// Handshake outcome carried from the upgrade handler into the session
/// task: who connected and which group they resolved to.
#[derive(Debug)]
pub struct SessionSeed {
    /// Identity established from headers / query fallback.
    pub identity: Identity,
    /// Resolved group name.
    pub group: String,
}

/// Run a WebSocket session for an upgraded socket.
///
/// A rejected handshake closes the socket immediately with the cause's
/// close code; no registration and no broadcast happen. Otherwise:
///
/// 1. Register with the group registry, then publish `chat.user.join`
///    (registration first, so the joiner receives its own join)
/// 2. Relay inbound frames as `chat.message` broadcasts carrying the
///    connection's own identity
/// 3. Send periodic pings and disconnect unresponsive clients
/// 4. On any close signal, tear down exactly once: deregister, then
///    publish `chat.user.leave`
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    socket: WebSocket,
    handshake: Result<SessionSeed, HandshakeError>,
    registry: Arc<GroupRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let seed = match handshake {
        Ok(seed) => seed,
        Err(error) => {
            warn!(%error, code = error.close_code(), "handshake rejected");
            counter!(WS_HANDSHAKES_REJECTED_TOTAL, "cause" => rejection_cause(&error))
                .increment(1);
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: error.close_code(),
                    reason: error.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_buffer);
    let connection = Arc::new(ClientConnection::new(seed.identity, seed.group, send_tx));
    let _ = tracing::Span::current().record("conn_id", connection.id.as_str());

    info!(
        group = %connection.group,
        user_id = %connection.identity.user_id,
        nickname = %connection.identity.nickname,
        "client connected"
    );
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Register before the join broadcast so the joiner sees its own join.
    registry.join(&connection.group, connection.clone()).await;
    let _ = dispatcher
        .publish(
            &connection.group,
            &BroadcastEvent::UserJoin {
                username: connection.identity.nickname.clone(),
            },
        )
        .await;

    // Outbound forwarder with periodic ping frames.
    let outbound_conn = connection.clone();
    let ping_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
    let mut outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound relay loop. Exits on close frame, transport error, heartbeat
    // death of the write task, or server shutdown.
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("server shutting down, closing session");
                break;
            }
            _ = &mut outbound => {
                debug!("write task ended");
                break;
            }
            frame = ws_rx.next() => {
                let Some(Ok(message)) = frame else { break };
                match message {
                    Message::Text(text) => {
                        connection.mark_alive();
                        relay_inbound(text.as_str(), &connection, &dispatcher).await;
                    }
                    Message::Binary(data) => {
                        connection.mark_alive();
                        match std::str::from_utf8(&data) {
                            Ok(text) => relay_inbound(text, &connection, &dispatcher).await,
                            Err(_) => {
                                debug!(len = data.len(), "dropping non-UTF8 binary frame");
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
                }
            }
        }
    }

    teardown(&connection, &registry, &dispatcher).await;
    outbound.abort();
}

/// Republish one inbound frame to the connection's group.
///
/// Sender metadata always comes from the connection's own identity; any
/// sender fields the client supplied are ignored.
async fn relay_inbound(text: &str, connection: &Arc<ClientConnection>, dispatcher: &Dispatcher) {
    let message = match decode_inbound(text) {
        InboundPayload::Chat { message } => message,
        InboundPayload::RawText { text } => {
            counter!(CHAT_PAYLOAD_FALLBACKS_TOTAL).increment(1);
            debug!("payload failed structural decode, relaying as raw text");
            serde_json::Value::String(text)
        }
        InboundPayload::Unrecognized { kind } => {
            counter!(CHAT_UNRECOGNIZED_KINDS_TOTAL).increment(1);
            warn!(kind, "dropping payload with unrecognized event kind");
            return;
        }
    };

    counter!(CHAT_MESSAGES_TOTAL).increment(1);
    let _ = dispatcher
        .publish(
            &connection.group,
            &BroadcastEvent::Message {
                message,
                sender: connection.identity.email.clone(),
                nickname: connection.identity.nickname.clone(),
                profile_picture_url: connection.identity.profile_url.clone(),
            },
        )
        .await;
}

/// Deregister and announce the departure. Safe to call from racing close
/// paths: only the first caller does anything.
async fn teardown(
    connection: &Arc<ClientConnection>,
    registry: &GroupRegistry,
    dispatcher: &Dispatcher,
) {
    if !connection.begin_teardown() {
        return;
    }

    registry.leave(&connection.group, &connection.id).await;
    let _ = dispatcher
        .publish(
            &connection.group,
            &BroadcastEvent::UserLeave {
                username: connection.identity.nickname.clone(),
            },
        )
        .await;

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(
        group = %connection.group,
        user_id = %connection.identity.user_id,
        "client disconnected"
    );
}

/// Label value for the handshake rejection counter.
fn rejection_cause(error: &HandshakeError) -> &'static str {
    match error {
        HandshakeError::MissingIdentity => "missing_identity",
        HandshakeError::RoomNotFound(_) => "room_not_found",
        HandshakeError::Directory(_) => "directory_failure",
    }
}

#[cfg(test)]
mod tests {
    // Socket-driven session behavior (join/leave broadcasts, relay, close
    // codes) is covered by tests/integration.rs with real WebSocket
    // clients. Unit tests here validate the helpers.

    use super::*;
    use tokio::sync::mpsc;

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new(
            Identity {
                user_id: "u1".into(),
                nickname: "alice".into(),
                email: "a@x.com".into(),
                profile_url: "https://cdn.example/a.png".into(),
            },
            "g".into(),
            tx,
        ));
        (conn, rx)
    }

    #[test]
    fn rejection_causes_are_distinct() {
        use huddle_core::rooms::DirectoryError;
        let causes = [
            rejection_cause(&HandshakeError::MissingIdentity),
            rejection_cause(&HandshakeError::RoomNotFound("9".into())),
            rejection_cause(&HandshakeError::Directory(DirectoryError::Lookup(
                "down".into(),
            ))),
        ];
        assert_eq!(causes.len(), 3);
        assert!(causes.windows(2).all(|w| w[0] != w[1]));
    }

    #[tokio::test]
    async fn relay_stamps_sender_from_identity() {
        let registry = Arc::new(GroupRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let (conn, mut rx) = make_connection();
        registry.join("g", conn.clone()).await;

        relay_inbound(
            r#"{"type": "chat.message", "message": "hi", "sender": "forged@x.com"}"#,
            &conn,
            &dispatcher,
        )
        .await;

        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["sender"], "a@x.com");
        assert_eq!(parsed["nickname"], "alice");
        assert_eq!(parsed["profile_picture_url"], "https://cdn.example/a.png");
        assert_eq!(parsed["message"], "hi");
    }

    #[tokio::test]
    async fn relay_falls_back_to_raw_text() {
        let registry = Arc::new(GroupRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let (conn, mut rx) = make_connection();
        registry.join("g", conn.clone()).await;

        relay_inbound("not json at all", &conn, &dispatcher).await;

        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "chat.message");
        assert_eq!(parsed["message"], "not json at all");
    }

    #[tokio::test]
    async fn relay_drops_unrecognized_kinds() {
        let registry = Arc::new(GroupRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        let (conn, mut rx) = make_connection();
        registry.join("g", conn.clone()).await;

        relay_inbound(r#"{"type": "presence.typing"}"#, &conn, &dispatcher).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let registry = Arc::new(GroupRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());

        let (leaver, _rx_leaver) = make_connection();
        let (observer, mut rx_observer) = make_connection();
        registry.join("g", leaver.clone()).await;
        registry.join("g", observer.clone()).await;

        teardown(&leaver, &registry, &dispatcher).await;
        teardown(&leaver, &registry, &dispatcher).await;

        // Exactly one leave broadcast despite two teardown calls.
        let msg = rx_observer.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "chat.user.leave");
        assert_eq!(parsed["username"], "alice");
        assert!(rx_observer.try_recv().is_err());

        assert_eq!(registry.members_of("g").await.len(), 1);
    }
}
