//! Connection handlers for the Huddle server.
//!
//! This module bridges WebSocket connections to relay sessions and serves
//! the health and static endpoints.

use crate::config::{BackendKind, Config};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{Node, Session};
use huddle_protocol::codec;
use huddle_store::MemoryBackend;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The relay node of this process.
    pub node: Node,
    /// Server configuration.
    pub config: Config,
    /// Socket tasks still running.
    sessions: TaskTracker,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(node: Node, config: Config) -> Self {
        Self {
            node,
            config,
            sessions: TaskTracker::new(),
        }
    }

    /// Close every open session, wait for their presence cleanup, then stop
    /// the relay node.
    pub async fn shutdown(&self) {
        self.node.shutdown_token().cancel();
        self.sessions.close();
        self.sessions.wait().await;
        self.node.shutdown().await;
    }
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Requested display name. Blank or missing means "pick one for me".
    pub username: Option<String>,
}

/// Connect to the configured backend and start the relay node.
///
/// # Errors
///
/// Returns an error if the backend is unreachable; this is fatal at startup.
pub async fn build_node(config: &Config, shutdown: CancellationToken) -> Result<Node> {
    let relay_config = config.relay.relay_config();

    let node = match config.backend.kind {
        BackendKind::Memory => {
            Node::with_backend(MemoryBackend::new(), relay_config, shutdown).await?
        }
        #[cfg(feature = "redis")]
        BackendKind::Redis => {
            let backend = huddle_store::RedisBackend::connect(config.backend.redis_config())
                .await
                .with_context(|| {
                    format!(
                        "Failed to connect to Redis at {}:{}",
                        config.backend.redis_host, config.backend.redis_port
                    )
                })?;
            Node::with_backend(backend, relay_config, shutdown).await?
        }
        #[cfg(not(feature = "redis"))]
        BackendKind::Redis => {
            anyhow::bail!("Redis backend requested but huddle-server was built without `redis`")
        }
    };

    Ok(node)
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app: Router<Arc<AppState>> = Router::new()
        .route(&state.config.websocket_path, get(ws_handler))
        .route("/health", get(health_handler));

    if let Some(dir) = &state.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the backend is unreachable or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let node = build_node(&config, shutdown.clone()).await?;

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(node, config));
    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    state.shutdown().await;
    info!("Huddle server stopped");

    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            info!("Shutdown signal received");
            // Open sockets watch the same token
            token.cancel();
        }
        () = token.cancelled() => {}
    }
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connections = state.node.stats().await.ok().map(|stats| stats.connections);

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.node.backend_name(),
        "connections": connections,
    }))
}

/// WebSocket upgrade handler. Every origin is accepted.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let sessions = state.sessions.clone();
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| {
            sessions.track_future(handle_websocket(socket, state, params.username))
        })
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, username: Option<String>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let mut session = state.node.session(username.as_deref());
    let mut events = match session.open().await {
        Ok(events) => events,
        Err(e) => {
            error!(name = %session.name(), error = %e, "Failed to open session");
            metrics::record_error("open");
            return;
        }
    };

    debug!(connection = %session.id(), name = %session.name(), "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let shutdown = state.node.shutdown_token();

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!(connection = %session.id(), "Closing socket for shutdown");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            // Events for this client from the hub
            Some(event) = events.recv() => {
                match codec::encode_server(&event) {
                    Ok(text) => {
                        metrics::record_message(text.len(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(connection = %session.id(), error = %e, "Failed to encode event");
                        metrics::record_error("encode");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => forward_text(&session, text).await,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => forward_text(&session, text).await,
                        Err(_) => {
                            warn!(connection = %session.id(), "Dropping non UTF-8 binary frame");
                            metrics::record_error("binary");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %session.id(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %session.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %session.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    session.close().await;
    debug!(connection = %session.id(), name = %session.name(), "WebSocket disconnected");
}

/// Publish one inbound chat body.
async fn forward_text(session: &Session, text: String) {
    metrics::record_message(text.len(), "inbound");
    if let Err(e) = session.on_text(text).await {
        warn!(connection = %session.id(), error = %e, "Failed to publish message");
        metrics::record_error("publish");
    }
}
