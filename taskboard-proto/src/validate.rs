//! Mutation validator: turns untrusted frames into typed requests.
//!
//! Validation is permissive on omission and strict on presence. A field that
//! is absent means "use the default" (create) or "leave unchanged" (update).
//! A field that is present with the wrong shape, including an explicit `null`,
//! rejects the whole request. Nothing is ever coerced.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::protocol::{
    ClientMessage, EVENT_CREATE, EVENT_DELETE, EVENT_MOVE, EVENT_UPDATE, ErrorCode, RawFrame,
    TaskMove, TaskRef, TaskUpdate,
};
use crate::task::{Column, TaskDraft, TaskId, TaskPatch};

/// Reasons a request is rejected before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The frame is not a JSON `{event, data}` envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// The event name is not a known request kind.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    /// The payload must be a JSON object.
    #[error("payload must be an object")]
    NotAnObject,
    /// A present field has the wrong shape or value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Offending field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// The request needs a task id and none was given.
    #[error("missing task id")]
    MissingId,
    /// A move named a column outside the enum.
    #[error("invalid column `{0}`")]
    InvalidColumn(String),
}

impl ValidationError {
    /// Error category reported to the originator.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidColumn(_) => ErrorCode::InvalidColumn,
            _ => ErrorCode::InvalidPayload,
        }
    }
}

/// Parses and validates one inbound text frame.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the envelope is malformed, the event is
/// unknown, or the payload fails the per-kind rules.
pub fn parse_request(text: &str) -> Result<ClientMessage, ValidationError> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|e| ValidationError::MalformedFrame(e.to_string()))?;
    validate(&frame.event, &frame.data)
}

/// Validates a payload for the given request event name.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the event is unknown or the payload is
/// invalid for it.
pub fn validate(event: &str, data: &Value) -> Result<ClientMessage, ValidationError> {
    match event {
        EVENT_CREATE => validate_create(data).map(ClientMessage::Create),
        EVENT_UPDATE => validate_update(data).map(ClientMessage::Update),
        EVENT_MOVE => validate_move(data).map(ClientMessage::Move),
        EVENT_DELETE => validate_delete(data).map(ClientMessage::Delete),
        other => Err(ValidationError::UnknownEvent(other.to_string())),
    }
}

/// Validates a create payload.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the payload is not an object or any
/// present field is invalid.
pub fn validate_create(data: &Value) -> Result<TaskDraft, ValidationError> {
    let obj = as_object(data)?;
    Ok(TaskDraft {
        title: title_field(obj)?,
        description: field(obj, "description")?,
        priority: field(obj, "priority")?,
        category: field(obj, "category")?,
        attachments: field(obj, "attachments")?,
    })
}

/// Validates an update payload.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the id is missing or invalid, or any
/// present field is invalid.
pub fn validate_update(data: &Value) -> Result<TaskUpdate, ValidationError> {
    let obj = as_object(data)?;
    let id = required_id(obj)?;
    let patch = TaskPatch {
        title: title_field(obj)?,
        description: field(obj, "description")?,
        priority: field(obj, "priority")?,
        category: field(obj, "category")?,
        attachments: field(obj, "attachments")?,
    };
    Ok(TaskUpdate { id, patch })
}

/// Validates a move payload.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidColumn`] if the column is missing or not
/// one of the board columns, or another variant if the id is unusable.
pub fn validate_move(data: &Value) -> Result<TaskMove, ValidationError> {
    let obj = as_object(data)?;
    let id = required_id(obj)?;
    // The column is checked here, before the store ever looks the id up, so
    // a bad column on an unknown task reports invalidColumn, not notFound.
    let column = match obj.get("column") {
        Some(Value::String(name)) => name
            .parse::<Column>()
            .map_err(|e| ValidationError::InvalidColumn(e.value))?,
        Some(other) => return Err(ValidationError::InvalidColumn(other.to_string())),
        None => return Err(ValidationError::InvalidColumn(String::new())),
    };
    Ok(TaskMove { id, column })
}

/// Validates a delete payload: either a bare id or an object carrying one.
///
/// # Errors
///
/// Returns a [`ValidationError`] if no usable id can be found.
pub fn validate_delete(data: &Value) -> Result<TaskRef, ValidationError> {
    let id = match data {
        Value::Object(obj) => required_id(obj)?,
        Value::Null => return Err(ValidationError::MissingId),
        bare => parse_id(bare)?,
    };
    Ok(TaskRef { id })
}

fn as_object(data: &Value) -> Result<&Map<String, Value>, ValidationError> {
    data.as_object().ok_or(ValidationError::NotAnObject)
}

fn required_id(obj: &Map<String, Value>) -> Result<TaskId, ValidationError> {
    match obj.get("id") {
        None | Some(Value::Null) => Err(ValidationError::MissingId),
        Some(value) => parse_id(value),
    }
}

fn parse_id(value: &Value) -> Result<TaskId, ValidationError> {
    TaskId::deserialize(value).map_err(|e| ValidationError::InvalidField {
        field: "id",
        reason: e.to_string(),
    })
}

/// Reads an optional field, rejecting `null` and wrong shapes.
fn field<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<T>, ValidationError> {
    match obj.get(name) {
        None => Ok(None),
        Some(Value::Null) => Err(ValidationError::InvalidField {
            field: name,
            reason: "must not be null".to_string(),
        }),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| ValidationError::InvalidField {
                field: name,
                reason: e.to_string(),
            }),
    }
}

fn title_field(obj: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
    let title: Option<String> = field(obj, "title")?;
    if title.as_deref().is_some_and(str::is_empty) {
        return Err(ValidationError::InvalidField {
            field: "title",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(title)
}
