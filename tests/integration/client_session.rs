// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the client session against a real server.
//!
//! These tests validate:
//! - Two `BoardClient`s converge on the same view through broadcasts
//! - The view only changes once the server echoes a request back
//! - One-shot helpers return the server's answer or its rejection
//! - After the server drops every connection, the session reconnects and
//!   the fresh snapshot replaces the view
//! - A caller that never drains its events still gets a live view and a
//!   prompt shutdown

use std::time::Duration;

use taskboard::client::{
    self, BoardClient, ClientError, ClientEvent, NetConfig, ReconnectConfig, wait_for_sync,
};
use taskboard_proto::protocol::{ClientMessage, ErrorCode, ServerMessage, TaskMove};
use taskboard_proto::task::{Column, TaskDraft, TaskId, TaskPatch};
use taskboard_server::server;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn net_config(addr: std::net::SocketAddr) -> NetConfig {
    let mut config = NetConfig::new(format!("ws://{addr}/ws"));
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        multiplier: 2,
    };
    config
}

/// Drains events until one satisfies `pred`, returning it.
async fn next_matching(
    events: &mut mpsc::Receiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn two_clients_converge() {
    let (addr, hub, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let config = net_config(addr);

    let (alice, mut alice_events) = BoardClient::connect(&config).await.unwrap();
    let (bob, mut bob_events) = BoardClient::connect(&config).await.unwrap();
    wait_for_sync(&mut alice_events, WAIT).await.unwrap();
    wait_for_sync(&mut bob_events, WAIT).await.unwrap();

    alice.create_task(TaskDraft::titled("Write spec")).unwrap();
    for events in [&mut alice_events, &mut bob_events] {
        next_matching(events, |e| {
            matches!(e, ClientEvent::Message(ServerMessage::Created(_)))
        })
        .await;
    }

    bob.move_task(TaskId::from_seq(1), Column::InProgress).unwrap();
    bob.update_task(
        TaskId::from_seq(1),
        TaskPatch {
            description: Some("draft the protocol section".to_string()),
            ..TaskPatch::default()
        },
    )
    .unwrap();
    for events in [&mut alice_events, &mut bob_events] {
        next_matching(events, |e| {
            matches!(e, ClientEvent::Message(ServerMessage::Updated(_)))
        })
        .await;
    }

    let server_tasks = hub.snapshot().await.unwrap();
    assert_eq!(alice.view().tasks(), server_tasks.as_slice());
    assert_eq!(bob.view().tasks(), server_tasks.as_slice());
    assert_eq!(server_tasks[0].column, Column::InProgress);
    assert_eq!(server_tasks[0].title, "Write spec");

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn view_waits_for_the_echo() {
    let (addr, _hub, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let (client, mut events) = BoardClient::connect(&net_config(addr)).await.unwrap();
    wait_for_sync(&mut events, WAIT).await.unwrap();

    client.create_task(TaskDraft::titled("pending")).unwrap();
    // Nothing has come back yet, so nothing is shown.
    assert!(client.view().tasks().is_empty());

    next_matching(&mut events, |e| {
        matches!(e, ClientEvent::Message(ServerMessage::Created(_)))
    })
    .await;
    assert_eq!(client.view().tasks().len(), 1);

    client.delete_task(TaskId::from_seq(99)).unwrap();
    next_matching(&mut events, |e| {
        matches!(e, ClientEvent::Message(ServerMessage::Error(_)))
    })
    .await;
    let view = client.view();
    assert_eq!(view.tasks().len(), 1);
    assert_eq!(view.last_error().map(|n| n.code), Some(ErrorCode::NotFound));

    client.shutdown().await;
}

#[tokio::test]
async fn request_once_returns_answer_or_rejection() {
    let (addr, _hub, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let config = net_config(addr);

    let (answer, view) = client::request_once(
        &config,
        &ClientMessage::Create(TaskDraft::titled("Write spec")),
    )
    .await
    .unwrap();
    assert!(matches!(answer, ServerMessage::Created(ref t) if t.id.as_str() == "1"));
    assert_eq!(view.tasks().len(), 1);

    let (answer, _) = client::request_once(
        &config,
        &ClientMessage::Move(TaskMove {
            id: TaskId::from_seq(1),
            column: Column::Done,
        }),
    )
    .await
    .unwrap();
    assert!(matches!(answer, ServerMessage::Moved(ref t) if t.column == Column::Done));

    let rejected = client::request_once(
        &config,
        &ClientMessage::Move(TaskMove {
            id: TaskId::from_seq(7),
            column: Column::Done,
        }),
    )
    .await;
    assert!(matches!(
        rejected,
        Err(ClientError::Rejected(ref n)) if n.code == ErrorCode::NotFound
    ));

    let board = client::fetch_board(&config).await.unwrap();
    assert!(board.synced());
    assert_eq!(board.stats().completion_percent, 100);
}

#[tokio::test]
async fn reconnect_delivers_fresh_snapshot() {
    let (addr, hub, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let mut config = net_config(addr);
    config.reconnect.initial_delay = Duration::from_millis(300);
    let (client, mut events) = BoardClient::connect(&config).await.unwrap();
    wait_for_sync(&mut events, WAIT).await.unwrap();

    client.create_task(TaskDraft::titled("before")).unwrap();
    next_matching(&mut events, |e| {
        matches!(e, ClientEvent::Message(ServerMessage::Created(_)))
    })
    .await;

    hub.close_all().unwrap();
    next_matching(&mut events, |e| matches!(e, ClientEvent::Disconnected)).await;

    // A change made while the client was away arrives through the new snapshot.
    let other_config = net_config(addr);
    let request = ClientMessage::Create(TaskDraft::titled("while away"));
    let (answer, _) = client::request_once(&other_config, &request).await.unwrap();
    assert!(matches!(answer, ServerMessage::Created(_)));

    next_matching(&mut events, |e| matches!(e, ClientEvent::Connected)).await;
    next_matching(&mut events, |e| {
        matches!(e, ClientEvent::Message(ServerMessage::Snapshot(_)))
    })
    .await;
    // The change made while away shows up through the snapshot, or through a
    // broadcast right behind it if the reconnect won the race.
    tokio::time::timeout(WAIT, async {
        while client.view().tasks().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(client.view().tasks(), hub.snapshot().await.unwrap().as_slice());
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn requests_are_refused_while_disconnected() {
    let (addr, hub, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let mut config = net_config(addr);
    config.reconnect.initial_delay = Duration::from_secs(30);
    config.reconnect.max_delay = Duration::from_secs(30);
    let (client, mut events) = BoardClient::connect(&config).await.unwrap();
    wait_for_sync(&mut events, WAIT).await.unwrap();

    hub.close_all().unwrap();
    next_matching(&mut events, |e| matches!(e, ClientEvent::Disconnected)).await;

    assert!(!client.is_connected());
    assert!(matches!(
        client.create_task(TaskDraft::default()),
        Err(ClientError::NotConnected)
    ));

    // Shutdown interrupts the backoff sleep.
    tokio::time::timeout(WAIT, client.shutdown()).await.unwrap();
}

#[tokio::test]
async fn undrained_events_do_not_stall_the_session() {
    let (addr, _hub, _handle) = server::start_server("127.0.0.1:0").await.unwrap();
    let mut config = net_config(addr);
    config.event_buffer = 4;
    // Nobody reads these events.
    let (idle, _idle_events) = BoardClient::connect(&config).await.unwrap();

    let (writer, mut writer_events) = BoardClient::connect(&net_config(addr)).await.unwrap();
    wait_for_sync(&mut writer_events, WAIT).await.unwrap();
    for i in 0..20 {
        writer.create_task(TaskDraft::titled(format!("task {i}"))).unwrap();
    }

    tokio::time::timeout(WAIT, async {
        while idle.view().tasks().len() < 20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("view stopped updating while events were not drained");

    tokio::time::timeout(WAIT, idle.shutdown())
        .await
        .expect("shutdown hung on a full event channel");
    writer.shutdown().await;
}
