//! Authoritative in-memory task store.
//!
//! The [`TaskStore`] owns the canonical copy of every task. It assigns ids,
//! fills defaults, and applies mutations; it never broadcasts. It is not
//! synchronized: a single owner (the hub) serializes all access.

use indexmap::IndexMap;
use taskboard_proto::task::{
    Column, DEFAULT_TITLE, Task, TaskDraft, TaskId, TaskPatch, Timestamp,
};

use crate::error::BoardError;

/// First id handed out by a fresh store.
const FIRST_ID: u64 = 1;

/// Canonical mapping from task id to task, in insertion order.
#[derive(Debug)]
pub struct TaskStore {
    tasks: IndexMap<TaskId, Task>,
    next_id: u64,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty store whose first task will get id `"1"`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: IndexMap::new(),
            next_id: FIRST_ID,
        }
    }

    /// Creates a task from `draft`, filling defaults.
    ///
    /// The new task always starts in [`Column::Todo`] and gets an id greater
    /// than any previously assigned by this store.
    pub fn create_task(&mut self, draft: TaskDraft) -> Task {
        let id = TaskId::from_seq(self.next_id);
        self.next_id += 1;

        let task = Task {
            id: id.clone(),
            title: draft.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: draft.description.unwrap_or_default(),
            column: Column::Todo,
            priority: draft.priority.unwrap_or_default(),
            category: draft.category.unwrap_or_default(),
            attachments: draft.attachments.unwrap_or_default(),
            created_at: Timestamp::now(),
        };
        self.tasks.insert(id, task.clone());
        task
    }

    /// Merges the fields present in `patch` into the task `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if no task has this id.
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Task, BoardError> {
        let task = self.get_mut(id)?;
        patch.apply_to(task);
        Ok(task.clone())
    }

    /// Moves the task `id` to `column`, leaving every other field untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if no task has this id.
    pub fn move_task(&mut self, id: &TaskId, column: Column) -> Result<Task, BoardError> {
        let task = self.get_mut(id)?;
        task.column = column;
        Ok(task.clone())
    }

    /// Removes the task `id` permanently and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if no task has this id.
    pub fn delete_task(&mut self, id: &TaskId) -> Result<TaskId, BoardError> {
        self.tasks
            .shift_remove_entry(id)
            .map(|(id, _)| id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))
    }

    /// Returns every task in insertion order.
    #[must_use]
    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn get_mut(&mut self, id: &TaskId) -> Result<&mut Task, BoardError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))
    }
}
