//! Task data model shared by the board server and its clients.
//!
//! A [`Task`] is the only entity on the board. Its enumerated fields
//! ([`Column`], [`Priority`], [`Category`]) are closed sets: parsing an
//! unknown name fails with [`UnknownVariant`] instead of storing it.

use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Title assigned to tasks created without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Error returned when an enum name is outside its allowed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    /// Which enum was being parsed (`column`, `priority`, `category`).
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Server-assigned task identifier.
///
/// Rendered on the wire as a decimal string. Deserialization also accepts a
/// bare non-negative integer so that clients may send `{"id": 3}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates an id from the server's sequence counter.
    #[must_use]
    pub fn from_seq(seq: u64) -> Self {
        Self(seq.to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        match RawId::deserialize(deserializer)
            .map_err(|_| D::Error::custom("task id must be a string or a non-negative integer"))?
        {
            RawId::Text(s) if s.trim().is_empty() => {
                Err(D::Error::custom("task id must not be empty"))
            }
            RawId::Text(s) => Ok(Self(s)),
            RawId::Number(n) => Ok(Self::from_seq(n)),
        }
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

/// Workflow stage a task occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Column {
    /// Not started.
    #[default]
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl Column {
    /// Every column in board order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Wire name of the column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "inProgress",
            Self::Done => "done",
        }
    }

    /// Human-readable column heading.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }
}

/// Relative urgency of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Every priority from lowest to highest.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Wire name of the priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    /// Something is broken.
    Bug,
    /// New functionality. The default.
    #[default]
    Feature,
    /// Improvement to existing functionality.
    Enhancement,
}

impl Category {
    /// Every category.
    pub const ALL: [Self; 3] = [Self::Bug, Self::Feature, Self::Enhancement];

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "Bug",
            Self::Feature => "Feature",
            Self::Enhancement => "Enhancement",
        }
    }
}

macro_rules! named_enum {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum!(Column, "column");
named_enum!(Priority, "priority");
named_enum!(Category, "category");

/// A task as stored by the server and replicated to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned identifier, immutable.
    pub id: TaskId,
    /// Non-empty display title.
    pub title: String,
    /// Free-form description, possibly empty.
    pub description: String,
    /// Current workflow stage. Only changed by a move.
    pub column: Column,
    /// Urgency.
    pub priority: Priority,
    /// Kind of work.
    pub category: Category,
    /// Opaque attachment references (data URLs or paths) in display order.
    pub attachments: Vec<String>,
    /// When the server created the task.
    pub created_at: Timestamp,
}

/// Fields a client may supply when creating a task.
///
/// Absent fields take the documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Title, defaults to [`DEFAULT_TITLE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description, defaults to empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Priority, defaults to [`Priority::Medium`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Category, defaults to [`Category::Feature`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Attachments, defaults to none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
}

impl TaskDraft {
    /// Creates a draft carrying only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Field-level changes for an existing task.
///
/// `None` means "leave unchanged". The column is deliberately absent; it is
/// only changed through a move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Replacement attachment list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
}

impl TaskPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.attachments.is_none()
    }

    /// Merges the present fields into `task`, leaving the rest untouched.
    pub fn apply_to(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(attachments) = self.attachments {
            task.attachments = attachments;
        }
    }
}
