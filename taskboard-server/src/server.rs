//! HTTP and WebSocket front end of the board server.
//!
//! Each upgraded socket gets a writer task draining its outbound channel and
//! a reader task forwarding inbound frames to the [`Hub`]. The hub is the only
//! place the board is mutated; this module never touches the store directly.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::stats::BoardStats;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::hub::{Hub, HubHandle};
use crate::store::TaskStore;

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the board's single writer.
    pub hub: HubHandle,
    /// Browser origin allowed to open sockets; `None` allows any.
    pub allowed_origin: Option<Arc<str>>,
}

impl AppState {
    /// Creates state that accepts sockets from any origin.
    #[must_use]
    pub const fn new(hub: HubHandle) -> Self {
        Self {
            hub,
            allowed_origin: None,
        }
    }

    /// Restricts WebSocket upgrades to requests from `origin`.
    #[must_use]
    pub fn with_allowed_origin(mut self, origin: Option<String>) -> Self {
        self.allowed_origin = origin.map(Arc::from);
        self
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Register with the hub, which queues the snapshot as the first frame.
/// 2. Forward inbound text frames to the hub as requests.
/// 3. Drain the outbound channel (snapshot, broadcasts, errors) to the socket.
/// 4. On disconnect, unregister from the hub.
pub async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create a channel for sending messages to this client's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let conn_id = match hub.connect(tx) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "rejecting connection");
            return;
        }
    };

    // Spawn a writer task that forwards messages from the channel to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id = %conn_id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Reader loop: forward inbound frames to the hub in arrival order.
    let reader_hub = hub.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            let frame = match msg {
                Message::Text(text) => text.to_string(),
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        tracing::warn!(conn_id = %conn_id, "dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => {
                    tracing::info!(conn_id = %conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore ping and pong frames.
                    continue;
                }
            };
            if reader_hub.request(conn_id, frame).is_err() {
                break;
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    let _ = hub.disconnect(conn_id);
    tracing::info!(conn_id = %conn_id, "client disconnected");
}

/// Builds the axum router for the board.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/ws", get(ws_handler))
        .route("/tasks", get(list_tasks))
        .route("/stats", get(board_stats))
        .with_state(state)
}

/// Starts a server with a fresh empty board on the given address and returns
/// the bound address and a join handle.
///
/// This is the primary entry point used by test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, HubHandle, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let (hub, _hub_task) = Hub::new(TaskStore::new()).spawn();
    let (bound_addr, handle) = start_server_with_state(addr, AppState::new(hub.clone())).await?;
    Ok((bound_addr, hub, handle))
}

/// Starts a server from a resolved [`ServerConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the configured address.
pub async fn start_server_with_config(
    config: &ServerConfig,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let (hub, _hub_task) = Hub::with_max_frame_size(TaskStore::new(), config.max_frame_size).spawn();
    let state = AppState::new(hub).with_allowed_origin(config.allowed_origin.clone());
    start_server_with_state(&config.bind_addr(), state).await
}

/// Starts the server with pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: AppState,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "board server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port).
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, HubHandle, tokio::task::JoinHandle<()>)
{
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

async fn banner() -> &'static str {
    concat!("taskboard-server ", env!("CARGO_PKG_VERSION"))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if let Some(allowed) = state.allowed_origin.as_deref()
        && let Some(origin) = headers.get(header::ORIGIN)
        && origin.as_bytes() != allowed.as_bytes()
    {
        tracing::warn!(origin = ?origin, "refusing WebSocket from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn list_tasks(State(state): State<AppState>) -> Response {
    match state.hub.snapshot().await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn board_stats(State(state): State<AppState>) -> Response {
    match state.hub.snapshot().await {
        Ok(tasks) => Json(BoardStats::from_tasks(&tasks)).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
