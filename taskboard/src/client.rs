//! WebSocket session to the board server.
//!
//! [`BoardClient::connect`] opens the socket and spawns one background task
//! that owns it. The task decodes every inbound frame, folds it into the
//! shared [`BoardView`] and forwards it to the caller as a [`ClientEvent`].
//! When the socket drops, the task reconnects with exponential backoff; the
//! server opens every new connection with a fresh snapshot, which replaces
//! the view wholesale.
//!
//! ```text
//! caller  ── SessionCommand ──>  session task  <── frames ──>  server
//!         <──  ClientEvent  ───       │
//!                                     └── folds into Arc<Mutex<BoardView>>
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use taskboard_proto::protocol::{
    self, ClientMessage, CodecError, ErrorNotice, ServerMessage, TaskMove, TaskRef, TaskUpdate,
};
use taskboard_proto::task::{Column, TaskDraft, TaskId, TaskPatch};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::reconcile::BoardView;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Default capacity of the event channel handed to the caller.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Errors surfaced by the client session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Opening the WebSocket failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Server URL that was dialed.
        url: String,
        /// Transport-level reason.
        reason: String,
    },

    /// An operation did not complete in time.
    #[error("timed out waiting for the server")]
    Timeout,

    /// The session is between connections.
    #[error("not connected to the server")]
    NotConnected,

    /// The connection dropped while a request was outstanding.
    #[error("connection lost before the server answered")]
    Disconnected,

    /// The session task has stopped.
    #[error("client session closed")]
    Closed,

    /// The server answered a request with an `error` event.
    #[error("server rejected request: {}", .0.message)]
    Rejected(ErrorNotice),

    /// A request could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Notifications delivered to the caller of [`BoardClient::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A socket to the server is open.
    Connected,
    /// The socket dropped; the session is reconnecting.
    Disconnected,
    /// A server event, already folded into the shared view.
    Message(ServerMessage),
}

/// Exponential backoff settings for reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

/// Delay sequence for consecutive failed reconnects.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    next: Duration,
}

impl Backoff {
    /// Starts a sequence at `config.initial_delay`.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let next = config.initial_delay.min(config.max_delay);
        Self { config, next }
    }

    /// Returns the delay to wait now and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next = current
            .saturating_mul(self.config.multiplier.max(1))
            .min(self.config.max_delay);
        current
    }

    /// Restarts the sequence after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.config.initial_delay.min(self.config.max_delay);
    }
}

/// Settings for one client session.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// WebSocket URL of the server (e.g., `ws://127.0.0.1:5001/ws`).
    pub server_url: String,
    /// Timeout for each connection attempt.
    pub connect_timeout: Duration,
    /// How long one-shot helpers wait for the snapshot and for an answer.
    pub request_timeout: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Capacity of the [`ClientEvent`] channel.
    pub event_buffer: usize,
}

impl NetConfig {
    /// Creates a config for `server_url` with default timeouts and backoff.
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug)]
enum SessionCommand {
    Send(String),
    Shutdown,
}

/// Handle to a live board session.
///
/// Requests are fire-and-forget: the view only changes when the server's
/// broadcast comes back through the event stream.
#[derive(Debug)]
pub struct BoardClient {
    view: Arc<Mutex<BoardView>>,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    connected: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl BoardClient {
    /// Connects to the server and spawns the session task.
    ///
    /// The first connection attempt is made before returning, so an
    /// unreachable server is reported here rather than retried forever.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] if the connection does not open in time.
    /// - [`ClientError::Connect`] if the server cannot be reached.
    pub async fn connect(
        config: &NetConfig,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), ClientError> {
        let ws = open(&config.server_url, config.connect_timeout).await?;
        tracing::info!(url = %config.server_url, "connected to board server");

        let view = Arc::new(Mutex::new(BoardView::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::channel(config.event_buffer.max(1));

        let session = Session {
            url: config.server_url.clone(),
            connect_timeout: config.connect_timeout,
            reconnect: config.reconnect.clone(),
            view: Arc::clone(&view),
            connected: Arc::clone(&connected),
            events: evt_tx,
        };
        let task = tokio::spawn(session.run(ws, cmd_rx));

        Ok((
            Self {
                view,
                cmd_tx,
                connected,
                task,
            },
            evt_rx,
        ))
    }

    /// A copy of the current view.
    #[must_use]
    pub fn view(&self) -> BoardView {
        self.view.lock().clone()
    }

    /// Shared handle to the live view.
    #[must_use]
    pub fn view_handle(&self) -> Arc<Mutex<BoardView>> {
        Arc::clone(&self.view)
    }

    /// Whether a socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends one request.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] while reconnecting.
    /// - [`ClientError::Closed`] if the session task has stopped.
    /// - [`ClientError::Codec`] if the request cannot be encoded.
    pub fn send(&self, request: &ClientMessage) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let text = protocol::encode_client(request)?;
        tracing::debug!(event = request.event_name(), "sending request");
        self.cmd_tx
            .send(SessionCommand::Send(text))
            .map_err(|_| ClientError::Closed)
    }

    /// Asks the server to create a task.
    ///
    /// # Errors
    ///
    /// See [`BoardClient::send`].
    pub fn create_task(&self, draft: TaskDraft) -> Result<(), ClientError> {
        self.send(&ClientMessage::Create(draft))
    }

    /// Asks the server to merge `patch` into task `id`.
    ///
    /// # Errors
    ///
    /// See [`BoardClient::send`].
    pub fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<(), ClientError> {
        self.send(&ClientMessage::Update(TaskUpdate { id, patch }))
    }

    /// Asks the server to move task `id` to `column`.
    ///
    /// # Errors
    ///
    /// See [`BoardClient::send`].
    pub fn move_task(&self, id: TaskId, column: Column) -> Result<(), ClientError> {
        self.send(&ClientMessage::Move(TaskMove { id, column }))
    }

    /// Asks the server to delete task `id`.
    ///
    /// # Errors
    ///
    /// See [`BoardClient::send`].
    pub fn delete_task(&self, id: TaskId) -> Result<(), ClientError> {
        self.send(&ClientMessage::Delete(TaskRef { id }))
    }

    /// Closes the socket and waits for the session task to finish.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "session task failed");
        }
    }
}

/// Waits until the first snapshot has been applied.
///
/// # Errors
///
/// - [`ClientError::Timeout`] if no snapshot arrives within `timeout`.
/// - [`ClientError::Closed`] if the event stream ends first.
pub async fn wait_for_sync(
    events: &mut mpsc::Receiver<ClientEvent>,
    timeout: Duration,
) -> Result<(), ClientError> {
    let synced = async {
        while let Some(event) = events.recv().await {
            if matches!(event, ClientEvent::Message(ServerMessage::Snapshot(_))) {
                return Ok(());
            }
        }
        Err(ClientError::Closed)
    };
    tokio::time::timeout(timeout, synced)
        .await
        .map_err(|_| ClientError::Timeout)?
}

/// Waits for the server's answer to `request`.
///
/// The protocol carries no request ids. Errors are only ever sent to the
/// originator, so any `error` event is taken as the answer. Broadcasts are
/// matched by target id, or by title for creates.
///
/// # Errors
///
/// - [`ClientError::Rejected`] if the server answered with an error.
/// - [`ClientError::Disconnected`] if the socket dropped first.
/// - [`ClientError::Timeout`] if nothing matching arrives within `timeout`.
pub async fn await_outcome(
    events: &mut mpsc::Receiver<ClientEvent>,
    request: &ClientMessage,
    timeout: Duration,
) -> Result<ServerMessage, ClientError> {
    let outcome = async {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Message(ServerMessage::Error(notice)) => {
                    return Err(ClientError::Rejected(notice));
                }
                ClientEvent::Message(msg) if answers(request, &msg) => return Ok(msg),
                ClientEvent::Disconnected => return Err(ClientError::Disconnected),
                ClientEvent::Message(_) | ClientEvent::Connected => {}
            }
        }
        Err(ClientError::Closed)
    };
    tokio::time::timeout(timeout, outcome)
        .await
        .map_err(|_| ClientError::Timeout)?
}

/// Connects, sends one request, waits for its answer, and disconnects.
///
/// Returns the answering event and the view right after it was applied.
///
/// # Errors
///
/// Any [`ClientError`] from connecting, syncing, sending, or waiting.
pub async fn request_once(
    config: &NetConfig,
    request: &ClientMessage,
) -> Result<(ServerMessage, BoardView), ClientError> {
    let (client, mut events) = BoardClient::connect(config).await?;
    let result = async {
        wait_for_sync(&mut events, config.request_timeout).await?;
        client.send(request)?;
        let answer = await_outcome(&mut events, request, config.request_timeout).await?;
        Ok((answer, client.view()))
    }
    .await;
    drop(events);
    client.shutdown().await;
    result
}

/// Connects, waits for the snapshot, and disconnects.
///
/// # Errors
///
/// Any [`ClientError`] from connecting or syncing.
pub async fn fetch_board(config: &NetConfig) -> Result<BoardView, ClientError> {
    let (client, mut events) = BoardClient::connect(config).await?;
    let result = wait_for_sync(&mut events, config.request_timeout).await;
    let view = client.view();
    drop(events);
    client.shutdown().await;
    result.map(|()| view)
}

fn answers(request: &ClientMessage, msg: &ServerMessage) -> bool {
    match (request, msg) {
        (ClientMessage::Create(draft), ServerMessage::Created(task)) => draft
            .title
            .as_ref()
            .is_none_or(|title| *title == task.title),
        (ClientMessage::Update(update), ServerMessage::Updated(task)) => update.id == task.id,
        (ClientMessage::Move(mv), ServerMessage::Moved(task)) => {
            mv.id == task.id && mv.column == task.column
        }
        (ClientMessage::Delete(target), ServerMessage::Deleted(deleted)) => {
            target.id == deleted.id
        }
        _ => false,
    }
}

async fn open(url: &str, timeout: Duration) -> Result<WsStream, ClientError> {
    let (ws, _response) = tokio::time::timeout(timeout, connect_async(url))
        .await
        .map_err(|_| {
            tracing::warn!(url, "WebSocket connect timed out");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::warn!(url, err = %e, "WebSocket connect failed");
            ClientError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
    Ok(ws)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketEnd {
    Dropped,
    Shutdown,
}

struct Session {
    url: String,
    connect_timeout: Duration,
    reconnect: ReconnectConfig,
    view: Arc<Mutex<BoardView>>,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<ClientEvent>,
}

impl Session {
    async fn run(self, first: WsStream, mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>) {
        let mut backoff = Backoff::new(self.reconnect.clone());
        let mut ws = first;
        loop {
            self.connected.store(true, Ordering::Relaxed);
            self.emit(ClientEvent::Connected);

            let end = self.drive(ws, &mut cmd_rx).await;

            self.connected.store(false, Ordering::Relaxed);
            self.emit(ClientEvent::Disconnected);
            if end == SocketEnd::Shutdown {
                break;
            }

            ws = loop {
                let delay = backoff.next_delay();
                tracing::info!(delay_ms = delay.as_millis(), "reconnecting to board server");
                if !sleep_unless_shutdown(delay, &mut cmd_rx).await {
                    tracing::info!("session shut down while reconnecting");
                    return;
                }
                match open(&self.url, self.connect_timeout).await {
                    Ok(ws) => {
                        tracing::info!(url = %self.url, "reconnected to board server");
                        backoff.reset();
                        break ws;
                    }
                    Err(e) => tracing::warn!(error = %e, "reconnect attempt failed"),
                }
            };
        }
        tracing::info!("session task exiting");
    }

    /// Pumps one socket until it drops or the caller shuts down.
    async fn drive(
        &self,
        ws: WsStream,
        cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    ) -> SocketEnd {
        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.deliver(text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => self.deliver(text),
                        Err(_) => tracing::warn!("non-UTF-8 binary frame, skipping"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("board server closed the connection");
                        return SocketEnd::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Ping, pong and raw frames carry no board events.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(err = %e, "WebSocket read error");
                        return SocketEnd::Dropped;
                    }
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Send(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::warn!(err = %e, "WebSocket send failed");
                            return SocketEnd::Dropped;
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SocketEnd::Shutdown;
                    }
                },
            }
        }
    }

    fn deliver(&self, text: &str) {
        match protocol::decode_server(text) {
            Ok(Some(msg)) => {
                self.view.lock().apply(&msg);
                self.emit(ClientEvent::Message(msg));
            }
            Ok(None) => tracing::debug!("unknown server event ignored"),
            Err(e) => tracing::warn!(err = %e, "malformed server frame, skipping"),
        }
    }

    /// Hands an event to the caller without ever stalling the socket.
    ///
    /// The view has already been updated, so a full channel only costs the
    /// caller the notification.
    fn emit(&self, event: ClientEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("event channel full, dropping client event");
            }
        }
    }
}

/// Sleeps for `delay`, dropping any requests sent meanwhile.
///
/// Returns `false` if the caller shut the session down.
async fn sleep_unless_shutdown(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Send(_)) => {
                    tracing::warn!("request dropped while reconnecting");
                }
                Some(SessionCommand::Shutdown) | None => return false,
            },
        }
    }
}
