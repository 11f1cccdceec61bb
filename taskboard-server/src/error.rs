//! Error taxonomy for request processing on the board server.

use taskboard_proto::protocol::{ErrorCode, ErrorNotice};
use taskboard_proto::task::TaskId;
use taskboard_proto::validate::ValidationError;

/// Why a mutation request was not applied.
///
/// Every variant is reported to the originating connection only, as an
/// `error` event; the store is never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The request failed shape or enum validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(ValidationError),
    /// The request named a task that does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// A move named a column outside the board's columns.
    #[error("invalid column `{0}`")]
    InvalidColumn(String),
    /// The inbound frame exceeded the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

impl From<ValidationError> for BoardError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidColumn(column) => Self::InvalidColumn(column),
            other => Self::InvalidPayload(other),
        }
    }
}

impl BoardError {
    /// Error category sent to the originator.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidPayload(_) | Self::FrameTooLarge { .. } => ErrorCode::InvalidPayload,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidColumn(_) => ErrorCode::InvalidColumn,
        }
    }

    /// Builds the notification payload for the originator.
    #[must_use]
    pub fn to_notice(&self) -> ErrorNotice {
        ErrorNotice {
            message: self.to_string(),
            code: self.code(),
        }
    }
}

/// The hub task has stopped and no longer accepts commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("board hub is not running")]
pub struct HubClosed;
