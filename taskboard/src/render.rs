//! Plain-text rendering of the board for the terminal client.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use taskboard_proto::protocol::ServerMessage;
use taskboard_proto::stats::BoardStats;
use taskboard_proto::task::{Column, Task, Timestamp};

use crate::reconcile::BoardView;

/// Formats a task timestamp with a chrono format string.
///
/// Falls back to the raw millisecond value when it is out of chrono's range
/// or when `format` does not render.
#[must_use]
pub fn format_timestamp(ts: Timestamp, format: &str) -> String {
    let raw = || ts.as_millis().to_string();
    let Some(dt) = i64::try_from(ts.as_millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    else {
        return raw();
    };
    let mut out = String::new();
    match write!(out, "{}", dt.format(format)) {
        Ok(()) => out,
        Err(_) => raw(),
    }
}

/// One line describing a task.
#[must_use]
pub fn task_line(task: &Task, timestamp_format: &str) -> String {
    let mut line = format!(
        "#{} {} [{} | {}]",
        task.id, task.title, task.priority, task.category
    );
    if !task.attachments.is_empty() {
        let _ = write!(line, " +{} attachment(s)", task.attachments.len());
    }
    let _ = write!(
        line,
        " created {}",
        format_timestamp(task.created_at, timestamp_format)
    );
    line
}

/// Summary line: column counts and completion.
#[must_use]
pub fn stats_line(stats: &BoardStats) -> String {
    format!(
        "{} tasks | todo {} | in progress {} | done {} | {}% complete",
        stats.total, stats.todo, stats.in_progress, stats.done, stats.completion_percent
    )
}

/// Renders the whole board, one section per column.
#[must_use]
pub fn render_board(view: &BoardView, timestamp_format: &str) -> String {
    let mut out = String::new();
    if let Some(notice) = view.last_error() {
        let _ = writeln!(out, "! {}", notice.message);
    }
    if !view.synced() {
        out.push_str("(waiting for board snapshot)\n");
        return out;
    }
    for column in Column::ALL {
        let tasks: Vec<_> = view.tasks_in(column).collect();
        let _ = writeln!(out, "== {} ({}) ==", column.label(), tasks.len());
        for task in tasks {
            let _ = writeln!(out, "  {}", task_line(task, timestamp_format));
            if !task.description.is_empty() {
                let _ = writeln!(out, "      {}", task.description);
            }
        }
    }
    out.push_str(&stats_line(&view.stats()));
    out.push('\n');
    out
}

/// Short confirmation for the answer to a one-shot command.
#[must_use]
pub fn describe_event(event: &ServerMessage) -> String {
    match event {
        ServerMessage::Snapshot(tasks) => format!("board has {} task(s)", tasks.len()),
        ServerMessage::Created(task) => format!("created #{} {}", task.id, task.title),
        ServerMessage::Updated(task) => format!("updated #{} {}", task.id, task.title),
        ServerMessage::Moved(task) => {
            format!("moved #{} to {}", task.id, task.column.label())
        }
        ServerMessage::Deleted(target) => format!("deleted #{}", target.id),
        ServerMessage::Error(notice) => format!("error: {}", notice.message),
    }
}
