//! Read-only board statistics derived from a task list.
//!
//! Used by the server's `/stats` endpoint and by client views to show column
//! counts and the completion percentage.

use serde::{Deserialize, Serialize};

use crate::task::{Column, Task};

/// Per-column counts and completion ratio of a board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
    /// Tasks in [`Column::Todo`].
    pub todo: usize,
    /// Tasks in [`Column::InProgress`].
    pub in_progress: usize,
    /// Tasks in [`Column::Done`].
    pub done: usize,
    /// All tasks.
    pub total: usize,
    /// `done / total` as a percentage rounded half up; 0 for an empty board.
    pub completion_percent: u8,
}

impl BoardStats {
    /// Computes statistics over `tasks`.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            match task.column {
                Column::Todo => stats.todo += 1,
                Column::InProgress => stats.in_progress += 1,
                Column::Done => stats.done += 1,
            }
        }
        stats.total = tasks.len();
        stats.completion_percent = completion_percent(stats.done, stats.total);
        stats
    }

    /// Number of tasks in `column`.
    #[must_use]
    pub const fn count(&self, column: Column) -> usize {
        match column {
            Column::Todo => self.todo,
            Column::InProgress => self.in_progress,
            Column::Done => self.done,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn completion_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    // round(done * 100 / total) with halves rounding up; done <= total keeps it <= 100.
    ((done * 200 + total) / (total * 2)) as u8
}
