//! Sync protocol messages exchanged over the board WebSocket.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`. Clients send
//! [`ClientMessage`]s; the server answers with [`ServerMessage`]s.

use serde::{Deserialize, Serialize};

use crate::task::{Column, Task, TaskDraft, TaskId, TaskPatch};

/// Inbound event: create a task.
pub const EVENT_CREATE: &str = "task:create";
/// Inbound event: update task fields.
pub const EVENT_UPDATE: &str = "task:update";
/// Inbound event: move a task to another column.
pub const EVENT_MOVE: &str = "task:move";
/// Inbound event: delete a task.
pub const EVENT_DELETE: &str = "task:delete";

/// Outbound event: full snapshot for a newly connected endpoint.
pub const EVENT_SNAPSHOT: &str = "sync:tasks";
/// Outbound event: a task was created.
pub const EVENT_CREATED: &str = "task:created";
/// Outbound event: a task was updated.
pub const EVENT_UPDATED: &str = "task:updated";
/// Outbound event: a task changed column.
pub const EVENT_MOVED: &str = "task:moved";
/// Outbound event: a task was deleted.
pub const EVENT_DELETED: &str = "task:deleted";
/// Outbound event: a request from this endpoint was rejected.
pub const EVENT_ERROR: &str = "error";

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Payload of an update request: the target id plus the changed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// Task to update.
    pub id: TaskId,
    /// Fields to change.
    #[serde(flatten)]
    pub patch: TaskPatch,
}

/// Payload of a move request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMove {
    /// Task to move.
    pub id: TaskId,
    /// Destination column.
    pub column: Column,
}

/// A bare task reference, used by delete requests and deleted events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    /// The referenced task.
    pub id: TaskId,
}

/// Requests a client sends to the server.
///
/// Produced on the server side only by [`crate::validate::parse_request`],
/// which is the boundary for untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Create a task from a draft.
    #[serde(rename = "task:create")]
    Create(TaskDraft),
    /// Merge fields into an existing task.
    #[serde(rename = "task:update")]
    Update(TaskUpdate),
    /// Change a task's column.
    #[serde(rename = "task:move")]
    Move(TaskMove),
    /// Remove a task.
    #[serde(rename = "task:delete")]
    Delete(TaskRef),
}

impl ClientMessage {
    /// Wire event name of this request.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Create(_) => EVENT_CREATE,
            Self::Update(_) => EVENT_UPDATE,
            Self::Move(_) => EVENT_MOVE,
            Self::Delete(_) => EVENT_DELETE,
        }
    }

    /// Id of the task this request targets, if it targets an existing one.
    #[must_use]
    pub const fn target(&self) -> Option<&TaskId> {
        match self {
            Self::Create(_) => None,
            Self::Update(TaskUpdate { id, .. })
            | Self::Move(TaskMove { id, .. })
            | Self::Delete(TaskRef { id }) => Some(id),
        }
    }
}

/// Machine-readable category of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// The request failed shape or enum validation.
    InvalidPayload,
    /// The request referenced a task that does not exist.
    NotFound,
    /// A move named a column outside the enum.
    InvalidColumn,
}

/// Error notification delivered only to the originator of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Human-readable description.
    pub message: String,
    /// Error category.
    pub code: ErrorCode,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Complete task list, sent once to a newly connected endpoint.
    #[serde(rename = "sync:tasks")]
    Snapshot(Vec<Task>),
    /// A task was created.
    #[serde(rename = "task:created")]
    Created(Task),
    /// A task's fields changed.
    #[serde(rename = "task:updated")]
    Updated(Task),
    /// A task changed column.
    #[serde(rename = "task:moved")]
    Moved(Task),
    /// A task was removed.
    #[serde(rename = "task:deleted")]
    Deleted(TaskRef),
    /// A request from this endpoint was rejected.
    #[serde(rename = "error")]
    Error(ErrorNotice),
}

impl ServerMessage {
    /// Every outbound event name this protocol version understands.
    pub const EVENTS: [&'static str; 6] = [
        EVENT_SNAPSHOT,
        EVENT_CREATED,
        EVENT_UPDATED,
        EVENT_MOVED,
        EVENT_DELETED,
        EVENT_ERROR,
    ];

    /// Wire event name of this message.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => EVENT_SNAPSHOT,
            Self::Created(_) => EVENT_CREATED,
            Self::Updated(_) => EVENT_UPDATED,
            Self::Moved(_) => EVENT_MOVED,
            Self::Deleted(_) => EVENT_DELETED,
            Self::Error(_) => EVENT_ERROR,
        }
    }

    /// Returns `true` for messages that go to every endpoint.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::Created(_) | Self::Updated(_) | Self::Moved(_) | Self::Deleted(_)
        )
    }
}

/// Untyped frame envelope, used to look at the event name before the payload.
#[derive(Debug, Deserialize)]
pub struct RawFrame {
    /// Event name.
    pub event: String,
    /// Payload, `null` when absent.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Encodes a [`ClientMessage`] as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Encodes a [`ServerMessage`] as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a server frame.
///
/// Returns `Ok(None)` for well-formed frames whose event name is not known to
/// this protocol version, so newer servers can add events without breaking
/// older clients.
///
/// # Errors
///
/// Returns `CodecError::Json` if the frame is not JSON, lacks an `event`, or a
/// known event carries a malformed payload.
pub fn decode_server(text: &str) -> Result<Option<ServerMessage>, CodecError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    if !ServerMessage::EVENTS.contains(&raw.event.as_str()) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(text)?))
}
