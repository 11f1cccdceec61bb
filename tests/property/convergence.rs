// Test-specific lint overrides: property tests use unwrap freely.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::doc_markdown)]

//! Property-based tests for the client reconciler.
//!
//! Uses proptest to verify:
//! 1. Two views fed the same event sequence are equal, whatever they held
//!    before the snapshot.
//! 2. Applying a `created` event twice equals applying it once.
//! 3. A view folded from a server's broadcasts matches the server's own list.
//! 4. A `moved` event changes only the column of its target.

use std::collections::HashSet;

use proptest::prelude::*;
use taskboard::reconcile::{BoardView, apply_event, reduce};
use taskboard_proto::protocol::{ServerMessage, TaskRef};
use taskboard_proto::task::{Category, Column, Priority, Task, TaskId, Timestamp};

// --- Strategies ---

fn arb_task(max_id: u64) -> impl Strategy<Value = Task> {
    (
        1..=max_id,
        "[A-Za-z ]{1,16}",
        prop::sample::select(Column::ALL.to_vec()),
        prop::sample::select(Priority::ALL.to_vec()),
        prop::sample::select(Category::ALL.to_vec()),
        any::<u32>(),
    )
        .prop_map(|(id, title, column, priority, category, ts)| Task {
            id: TaskId::from_seq(id),
            title,
            description: String::new(),
            column,
            priority,
            category,
            attachments: Vec::new(),
            created_at: Timestamp::from_millis(u64::from(ts)),
        })
}

fn arb_event() -> impl Strategy<Value = ServerMessage> {
    prop_oneof![
        prop::collection::vec(arb_task(8), 0..5).prop_map(ServerMessage::Snapshot),
        arb_task(8).prop_map(ServerMessage::Created),
        arb_task(8).prop_map(ServerMessage::Updated),
        arb_task(8).prop_map(ServerMessage::Moved),
        (1..=8u64).prop_map(|id| ServerMessage::Deleted(TaskRef {
            id: TaskId::from_seq(id)
        })),
    ]
}

/// One step of a server-side history, applied to a reference list.
#[derive(Debug, Clone)]
enum Step {
    Create(String),
    Rename(usize, String),
    Move(usize, Column),
    Delete(usize),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Step::Create),
        (any::<usize>(), "[a-z]{1,8}").prop_map(|(i, t)| Step::Rename(i, t)),
        (any::<usize>(), prop::sample::select(Column::ALL.to_vec()))
            .prop_map(|(i, c)| Step::Move(i, c)),
        any::<usize>().prop_map(Step::Delete),
    ]
}

/// Replays `steps` the way the server would and returns the broadcasts it
/// would emit, along with its final task list.
fn simulate(steps: &[Step]) -> (Vec<ServerMessage>, Vec<Task>) {
    let mut tasks: Vec<Task> = Vec::new();
    let mut events = Vec::new();
    let mut next_id = 1;
    for step in steps {
        match step {
            Step::Create(title) => {
                let task = Task {
                    id: TaskId::from_seq(next_id),
                    title: title.clone(),
                    description: String::new(),
                    column: Column::Todo,
                    priority: Priority::Medium,
                    category: Category::Feature,
                    attachments: Vec::new(),
                    created_at: Timestamp::from_millis(next_id),
                };
                next_id += 1;
                tasks.push(task.clone());
                events.push(ServerMessage::Created(task));
            }
            Step::Rename(i, title) if !tasks.is_empty() => {
                let idx = i % tasks.len();
                tasks[idx].title.clone_from(title);
                events.push(ServerMessage::Updated(tasks[idx].clone()));
            }
            Step::Move(i, column) if !tasks.is_empty() => {
                let idx = i % tasks.len();
                tasks[idx].column = *column;
                events.push(ServerMessage::Moved(tasks[idx].clone()));
            }
            Step::Delete(i) if !tasks.is_empty() => {
                let idx = i % tasks.len();
                let removed = tasks.remove(idx);
                events.push(ServerMessage::Deleted(TaskRef { id: removed.id }));
            }
            _ => {}
        }
    }
    (events, tasks)
}

proptest! {
    #[test]
    fn same_events_give_same_views(
        before_a in prop::collection::vec(arb_event(), 0..6),
        before_b in prop::collection::vec(arb_event(), 0..6),
        snapshot in prop::collection::vec(arb_task(8), 0..5),
        events in prop::collection::vec(arb_event(), 0..24),
    ) {
        let mut a = BoardView::new();
        let mut b = BoardView::new();
        for event in &before_a {
            a.apply(event);
        }
        for event in &before_b {
            b.apply(event);
        }

        let snapshot = ServerMessage::Snapshot(snapshot);
        a.apply(&snapshot);
        b.apply(&snapshot);
        for event in &events {
            a.apply(event);
            b.apply(event);
        }
        prop_assert_eq!(a.tasks(), b.tasks());
    }

    #[test]
    fn created_is_idempotent(
        start in prop::collection::vec(arb_task(8), 0..5),
        task in arb_task(12),
    ) {
        let event = ServerMessage::Created(task);
        let once = reduce(start, &event);
        let twice = reduce(once.clone(), &event);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn folded_broadcasts_match_server_state(
        initial in prop::collection::vec(arb_step(), 0..10),
        later in prop::collection::vec(arb_step(), 0..30),
    ) {
        // A late joiner gets the snapshot after `initial`, then the rest.
        let (early_events, at_join) = simulate(&initial);
        let all_steps: Vec<Step> = initial.iter().chain(later.iter()).cloned().collect();
        let (all_events, final_tasks) = simulate(&all_steps);

        let mut early = BoardView::new();
        early.apply(&ServerMessage::Snapshot(Vec::new()));
        for event in &all_events {
            early.apply(event);
        }

        let mut late = BoardView::new();
        late.apply(&ServerMessage::Snapshot(at_join));
        for event in &all_events[early_events.len()..] {
            late.apply(event);
        }

        prop_assert_eq!(early.tasks(), final_tasks.as_slice());
        prop_assert_eq!(late.tasks(), final_tasks.as_slice());
    }

    #[test]
    fn move_changes_only_column(
        start in prop::collection::vec(arb_task(8), 1..5),
        pick in any::<usize>(),
        column in prop::sample::select(Column::ALL.to_vec()),
        title in "[a-z]{1,8}",
    ) {
        let mut seen = HashSet::new();
        let mut tasks = start;
        tasks.retain(|t| seen.insert(t.id.clone()));
        let idx = pick % tasks.len();
        let mut moved = tasks[idx].clone();
        moved.column = column;
        moved.title = title;

        let before = tasks.clone();
        apply_event(&mut tasks, &ServerMessage::Moved(moved));

        for (i, (after, was)) in tasks.iter().zip(&before).enumerate() {
            if i == idx {
                prop_assert_eq!(after.column, column);
                prop_assert_eq!(&after.title, &was.title);
            } else {
                prop_assert_eq!(after, was);
            }
        }
    }
}
