//! Single-writer hub: owns the task store and the connection registry.
//!
//! All mutations are funnelled through one tokio task as [`HubCommand`]s and
//! processed strictly in arrival order. The hub applies each accepted request
//! to the [`TaskStore`] and then enqueues exactly one broadcast on every
//! registered connection's outbound channel, so every endpoint observes the
//! same total order of changes. Rejected requests produce an `error` event on
//! the originator's channel only.

use std::collections::HashMap;

use axum::extract::ws::Message;
use taskboard_proto::protocol::{self, ClientMessage, ServerMessage, TaskRef};
use taskboard_proto::task::Task;
use taskboard_proto::validate;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::{BoardError, HubClosed};
use crate::store::TaskStore;

/// Default maximum accepted inbound frame size in bytes (16 MiB).
///
/// Attachments travel inline as data URLs, so frames can be large.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Identifies one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new time-ordered connection identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands processed by the hub task, one at a time.
#[derive(Debug)]
pub enum HubCommand {
    /// Register a connection and send it the current snapshot.
    Connect {
        /// Identity of the new connection.
        conn_id: ConnectionId,
        /// Outbound channel drained by the connection's writer task.
        sender: mpsc::UnboundedSender<Message>,
    },
    /// An inbound text frame from a registered connection.
    Request {
        /// Originating connection.
        conn_id: ConnectionId,
        /// Raw, unvalidated frame.
        frame: String,
    },
    /// Remove a connection from the registry.
    Disconnect {
        /// Connection that went away.
        conn_id: ConnectionId,
    },
    /// Read the current task list.
    Snapshot {
        /// Where to deliver the list.
        reply: oneshot::Sender<Vec<Task>>,
    },
    /// Drop every connection handle, closing all sockets.
    CloseAll,
}

/// Outcome of applying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The store changed; send this event to every connection.
    Broadcast(ServerMessage),
    /// The request was rejected; send this error to the originator only.
    Reply(ServerMessage),
}

/// The board's single writer.
#[derive(Debug)]
pub struct Hub {
    store: TaskStore,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    max_frame_size: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(TaskStore::new())
    }
}

impl Hub {
    /// Creates a hub around `store` with the default frame size limit.
    #[must_use]
    pub fn new(store: TaskStore) -> Self {
        Self::with_max_frame_size(store, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a hub around `store` with a custom frame size limit.
    #[must_use]
    pub fn with_max_frame_size(store: TaskStore, max_frame_size: usize) -> Self {
        Self {
            store,
            connections: HashMap::new(),
            max_frame_size,
        }
    }

    /// Read access to the store.
    #[must_use]
    pub const fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Moves the hub onto its own tokio task and returns a handle to it.
    ///
    /// The task ends when every [`HubHandle`] has been dropped.
    #[must_use]
    pub fn spawn(self) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (HubHandle { tx }, handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle_command(cmd);
        }
        tracing::info!(
            tasks = self.store.len(),
            "hub stopped, discarding board state"
        );
    }

    /// Processes one command to completion.
    pub fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { conn_id, sender } => self.connect(conn_id, sender),
            HubCommand::Request { conn_id, frame } => self.handle_request(conn_id, &frame),
            HubCommand::Disconnect { conn_id } => {
                if self.connections.remove(&conn_id).is_some() {
                    tracing::info!(
                        conn_id = %conn_id,
                        connections = self.connections.len(),
                        "connection unregistered"
                    );
                }
            }
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.store.list_tasks());
            }
            HubCommand::CloseAll => {
                tracing::info!(
                    connections = self.connections.len(),
                    "closing all connections"
                );
                for sender in self.connections.values() {
                    let _ = sender.send(Message::Close(None));
                }
                self.connections.clear();
            }
        }
    }

    /// Validates and applies one request, without touching any connection.
    ///
    /// # Errors
    ///
    /// Returns a [`BoardError`] if the request is invalid or targets a
    /// missing task. The store is unchanged in that case.
    pub fn apply(&mut self, request: ClientMessage) -> Result<ServerMessage, BoardError> {
        let event = match request {
            ClientMessage::Create(draft) => ServerMessage::Created(self.store.create_task(draft)),
            ClientMessage::Update(update) => {
                ServerMessage::Updated(self.store.update_task(&update.id, update.patch)?)
            }
            ClientMessage::Move(mv) => ServerMessage::Moved(self.store.move_task(&mv.id, mv.column)?),
            ClientMessage::Delete(target) => ServerMessage::Deleted(TaskRef {
                id: self.store.delete_task(&target.id)?,
            }),
        };
        Ok(event)
    }

    /// Parses, validates and applies one raw frame.
    pub fn dispatch(&mut self, frame: &str) -> Dispatch {
        let result = self.check_frame_size(frame).and_then(|()| {
            let request = validate::parse_request(frame)?;
            self.apply(request)
        });
        match result {
            Ok(event) => Dispatch::Broadcast(event),
            Err(err) => Dispatch::Reply(ServerMessage::Error(err.to_notice())),
        }
    }

    fn check_frame_size(&self, frame: &str) -> Result<(), BoardError> {
        if frame.len() > self.max_frame_size {
            return Err(BoardError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    fn connect(&mut self, conn_id: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        let snapshot = ServerMessage::Snapshot(self.store.list_tasks());
        let Some(msg) = encode(&snapshot) else {
            return;
        };
        if sender.send(msg).is_err() {
            tracing::warn!(conn_id = %conn_id, "connection closed before snapshot");
            return;
        }
        self.connections.insert(conn_id, sender);
        tracing::info!(
            conn_id = %conn_id,
            tasks = self.store.len(),
            connections = self.connections.len(),
            "connection registered, snapshot sent"
        );
    }

    fn handle_request(&mut self, conn_id: ConnectionId, frame: &str) {
        match self.dispatch(frame) {
            Dispatch::Broadcast(event) => {
                tracing::debug!(
                    conn_id = %conn_id,
                    event = event.event_name(),
                    "mutation applied"
                );
                self.broadcast(&event);
            }
            Dispatch::Reply(reply) => {
                if let ServerMessage::Error(notice) = &reply {
                    tracing::warn!(
                        conn_id = %conn_id,
                        code = ?notice.code,
                        reason = %notice.message,
                        "request rejected"
                    );
                }
                self.send_to(conn_id, &reply);
            }
        }
    }

    /// Sends `event` to every registered connection, dropping dead handles.
    fn broadcast(&mut self, event: &ServerMessage) {
        let Some(msg) = encode(event) else {
            return;
        };
        self.connections.retain(|conn_id, sender| {
            let alive = sender.send(msg.clone()).is_ok();
            if !alive {
                tracing::warn!(conn_id = %conn_id, "dropping dead connection during broadcast");
            }
            alive
        });
    }

    fn send_to(&mut self, conn_id: ConnectionId, event: &ServerMessage) {
        let Some(sender) = self.connections.get(&conn_id) else {
            tracing::debug!(conn_id = %conn_id, "originator already gone, reply dropped");
            return;
        };
        if let Some(msg) = encode(event)
            && sender.send(msg).is_err()
        {
            self.connections.remove(&conn_id);
        }
    }
}

fn encode(event: &ServerMessage) -> Option<Message> {
    match protocol::encode_server(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, event = event.event_name(), "failed to encode event");
            None
        }
    }
}

/// Cloneable handle used by connection tasks and HTTP handlers to reach the
/// hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Registers a new connection; the hub sends it the snapshot first.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn connect(&self, sender: mpsc::UnboundedSender<Message>) -> Result<ConnectionId, HubClosed> {
        let conn_id = ConnectionId::new();
        self.send(HubCommand::Connect { conn_id, sender })?;
        Ok(conn_id)
    }

    /// Forwards an inbound frame from `conn_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn request(&self, conn_id: ConnectionId, frame: String) -> Result<(), HubClosed> {
        self.send(HubCommand::Request { conn_id, frame })
    }

    /// Unregisters `conn_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn disconnect(&self, conn_id: ConnectionId) -> Result<(), HubClosed> {
        self.send(HubCommand::Disconnect { conn_id })
    }

    /// Closes every connection; clients are expected to reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub fn close_all(&self) -> Result<(), HubClosed> {
        self.send(HubCommand::CloseAll)
    }

    /// Returns the current task list.
    ///
    /// # Errors
    ///
    /// Returns [`HubClosed`] if the hub task has stopped.
    pub async fn snapshot(&self) -> Result<Vec<Task>, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply })?;
        rx.await.map_err(|_| HubClosed)
    }

    fn send(&self, cmd: HubCommand) -> Result<(), HubClosed> {
        self.tx.send(cmd).map_err(|_| HubClosed)
    }
}
