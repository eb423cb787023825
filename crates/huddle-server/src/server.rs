//! `RelayServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::{Json, Response};
use axum::routing::get;
use huddle_core::rooms::{self, RoomDirectory};
use huddle_core::{identity, HandshakeError};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::dispatch::Dispatcher;
use crate::websocket::registry::GroupRegistry;
use crate::websocket::session::{run_ws_session, SessionSeed};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Group membership registry.
    pub registry: Arc<GroupRegistry>,
    /// Broadcast dispatcher over the registry.
    pub dispatcher: Arc<Dispatcher>,
    /// External room record store.
    pub rooms: Arc<dyn RoomDirectory>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Handle for rendering the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<GroupRegistry>,
    dispatcher: Arc<Dispatcher>,
    rooms: Arc<dyn RoomDirectory>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server over a room directory.
    pub fn new(
        config: ServerConfig,
        rooms: Arc<dyn RoomDirectory>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(GroupRegistry::new());
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(Dispatcher::new(registry.clone())),
            registry,
            rooms,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            rooms: self.rooms.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_default_handler))
            .route("/ws/chat/{room_id}", get(ws_room_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve. Returns the bound address and the serve task handle.
    ///
    /// The serve task exits after the shutdown coordinator is cancelled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "relay server listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(error) = serve.await {
                tracing::error!(%error, "server task failed");
            }
        });

        Ok((addr, handle))
    }

    /// Get the group registry.
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Get the broadcast dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.connection_count();
    let groups = state.registry.group_count().await;
    Json(health::health_check(state.start_time, connections, groups))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// GET /ws — join the default group.
async fn ws_default_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, headers, query, None, state).await
}

/// GET /ws/chat/{room_id} — join a specific room's group.
async fn ws_room_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, headers, query, Some(room_id), state).await
}

/// Resolve identity and group before the upgrade; the outcome rides into
/// the session task, which closes with a distinct code on failure.
async fn upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    query: Option<String>,
    room_id: Option<String>,
    state: AppState,
) -> Response {
    let handshake = resolve_handshake(&headers, query.as_deref(), room_id.as_deref(), &state).await;

    let registry = state.registry.clone();
    let dispatcher = state.dispatcher.clone();
    let config = state.config.clone();
    let cancel = state.shutdown.token();

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, handshake, registry, dispatcher, config, cancel)
        })
}

/// Identity extraction then room resolution, in that order: an anonymous
/// connection is rejected for identity even when the room is also bad.
async fn resolve_handshake(
    headers: &HeaderMap,
    query: Option<&str>,
    room_id: Option<&str>,
    state: &AppState,
) -> Result<SessionSeed, HandshakeError> {
    let identity = identity::extract(
        headers.iter().map(|(name, value)| (name.as_str(), value.as_bytes())),
        query.unwrap_or(""),
    )?;
    let group = rooms::resolve_group(state.rooms.as_ref(), room_id).await?;
    Ok(SessionSeed { identity, group })
}
