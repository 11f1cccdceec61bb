//! Pure reducer that folds server events into a client's view of the board.
//!
//! Every client runs the same deterministic fold over the same ordered event
//! stream, so all views converge on the server's state. The client never
//! changes its view optimistically: a local request only becomes visible once
//! the server echoes the resulting event back.

use taskboard_proto::protocol::{ErrorNotice, ServerMessage};
use taskboard_proto::stats::BoardStats;
use taskboard_proto::task::{Column, Task, TaskId};

/// Applies one event to `tasks` in place.
///
/// Returns `true` if the list changed.
///
/// - `Snapshot` replaces the list wholesale.
/// - `Created` appends unless the id is already present.
/// - `Updated` replaces the matching task in place.
/// - `Moved` changes only the matching task's column.
/// - `Deleted` removes the matching task.
/// - `Error` never changes the list.
///
/// Events naming an unknown id are no-ops.
pub fn apply_event(tasks: &mut Vec<Task>, event: &ServerMessage) -> bool {
    match event {
        ServerMessage::Snapshot(snapshot) => {
            if *tasks == *snapshot {
                return false;
            }
            tasks.clone_from(snapshot);
            true
        }
        ServerMessage::Created(task) => {
            if position(tasks, &task.id).is_some() {
                return false;
            }
            tasks.push(task.clone());
            true
        }
        ServerMessage::Updated(task) => {
            let Some(idx) = position(tasks, &task.id) else {
                tracing::debug!(id = %task.id, "update for unknown task ignored");
                return false;
            };
            if tasks[idx] == *task {
                return false;
            }
            tasks[idx] = task.clone();
            true
        }
        ServerMessage::Moved(task) => {
            let Some(idx) = position(tasks, &task.id) else {
                tracing::debug!(id = %task.id, "move for unknown task ignored");
                return false;
            };
            let changed = tasks[idx].column != task.column;
            tasks[idx].column = task.column;
            changed
        }
        ServerMessage::Deleted(target) => match position(tasks, &target.id) {
            Some(idx) => {
                tasks.remove(idx);
                true
            }
            None => false,
        },
        ServerMessage::Error(_) => false,
    }
}

/// Functional form of [`apply_event`]: `(view, event) -> view`.
#[must_use]
pub fn reduce(mut tasks: Vec<Task>, event: &ServerMessage) -> Vec<Task> {
    apply_event(&mut tasks, event);
    tasks
}

fn position(tasks: &[Task], id: &TaskId) -> Option<usize> {
    tasks.iter().position(|t| t.id == *id)
}

/// A client's local view of the board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardView {
    tasks: Vec<Task>,
    synced: bool,
    last_error: Option<ErrorNotice>,
}

impl BoardView {
    /// Creates an empty, not yet synced view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one server event into the view.
    ///
    /// Returns `true` if the task list changed.
    pub fn apply(&mut self, event: &ServerMessage) -> bool {
        match event {
            ServerMessage::Snapshot(_) => self.synced = true,
            ServerMessage::Error(notice) => {
                tracing::warn!(code = ?notice.code, reason = %notice.message, "server rejected request");
                self.last_error = Some(notice.clone());
            }
            _ => {}
        }
        apply_event(&mut self.tasks, event)
    }

    /// All tasks in server order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    /// Tasks in `column`, in server order.
    pub fn tasks_in(&self, column: Column) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.column == column)
    }

    /// Whether at least one snapshot has been applied.
    #[must_use]
    pub const fn synced(&self) -> bool {
        self.synced
    }

    /// The most recent error notice, if not yet cleared.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ErrorNotice> {
        self.last_error.as_ref()
    }

    /// Dismisses the error banner.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Column counts and completion percentage.
    #[must_use]
    pub fn stats(&self) -> BoardStats {
        BoardStats::from_tasks(&self.tasks)
    }

    /// Consumes the view, returning its tasks.
    #[must_use]
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}
