//! Integration tests for relay link loss and recovery.
//!
//! Uses the scripted connector to stage dial failures and replacement
//! transports, covering backoff, offline exhaustion, buffering while
//! disconnected, and flush on reconnect.
//!
//! Verification command: `cargo test --test reconnect`

use std::time::Duration;

use parley::connection::{
    BackoffConfig, ConnectionConfig, ConnectionManager, LinkStatus, SendError, SessionEvent,
};
use parley::transport::Transport;
use parley::transport::loopback::{LoopbackTransport, ScriptedConnector};
use parley_proto::codec;
use parley_proto::event::WireEvent;
use parley_proto::message::{
    ChatId, DeliveryStatus, MessageId, Timestamp, UserId, WireMessage,
};

// =============================================================================
// Test helpers
// =============================================================================

fn config() -> ConnectionConfig {
    ConnectionConfig {
        backoff: BackoffConfig {
            initial: Duration::from_millis(10),
            ceiling: Duration::from_millis(40),
            max_attempts: 4,
        },
        queue_capacity: 8,
        event_buffer: 64,
    }
}

fn message_event() -> (MessageId, WireEvent) {
    let id = MessageId::new();
    let event = WireEvent::Message {
        chat_id: ChatId::new(),
        message: WireMessage {
            id,
            text: "over the gap".into(),
            sender: UserId::new(),
            timestamp: Timestamp::now(),
            status: DeliveryStatus::Sent,
        },
    };
    (id, event)
}

async fn wait_for_status(manager: &ConnectionManager<ScriptedConnector>, want: LinkStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if manager.status() == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("status never reached {want:?}, last was {:?}", manager.status());
}

// =============================================================================
// Backoff and recovery
// =============================================================================

#[tokio::test]
async fn connects_after_initial_dial_failures() {
    let connector = ScriptedConnector::new();
    connector.push_failure().await;
    connector.push_failure().await;
    let (near, _far) = LoopbackTransport::create_pair(8);
    connector.push_transport(near).await;

    let (manager, mut events) = ConnectionManager::new(connector, config());
    manager.connect();
    wait_for_status(&manager, LinkStatus::Connected).await;

    // Backoff progress was visible as numbered reconnect attempts.
    let mut attempts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Link(LinkStatus::Reconnecting { attempt }) = event {
            attempts.push(attempt);
        }
    }
    assert_eq!(attempts, vec![2, 3]);
}

#[tokio::test]
async fn redials_when_the_transport_drops() {
    let connector = ScriptedConnector::new();
    let (near_a, far_a) = LoopbackTransport::create_pair(8);
    let (near_b, far_b) = LoopbackTransport::create_pair(8);
    connector.push_transport(near_a).await;
    connector.push_transport(near_b).await;

    let (manager, _events) = ConnectionManager::new(connector, config());
    manager.connect();
    wait_for_status(&manager, LinkStatus::Connected).await;

    // Kill the first link; the manager must come back on the second.
    drop(far_a);
    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_for_status(&manager, LinkStatus::Connected).await;

    let (_, event) = message_event();
    manager.send(event).await.expect("send on new link");
    let frame = far_b.recv().await.expect("frame on second transport");
    assert!(frame.contains("\"type\":\"message\""));
}

#[tokio::test]
async fn exhausted_attempts_go_offline() {
    let connector = ScriptedConnector::new(); // nothing scripted: every dial fails

    let (manager, _events) = ConnectionManager::new(connector, config());
    manager.connect();
    wait_for_status(&manager, LinkStatus::Offline).await;
}

#[tokio::test]
async fn offline_manager_accepts_a_fresh_connect() {
    let connector = ScriptedConnector::new();
    // First cycle: all four attempts fail. Second cycle: failures were
    // consumed, so push a transport for the retry.
    let (manager, _events) = ConnectionManager::new(connector, config());
    manager.connect();
    wait_for_status(&manager, LinkStatus::Offline).await;

    // A user-driven retry starts a new dial cycle.
    let (near, _far) = LoopbackTransport::create_pair(8);
    manager.connector().push_transport(near).await;
    manager.connect();
    wait_for_status(&manager, LinkStatus::Connected).await;
}

// =============================================================================
// Buffering across the gap
// =============================================================================

#[tokio::test]
async fn messages_buffered_while_down_flush_on_reconnect() {
    let connector = ScriptedConnector::new();
    connector.push_failure().await;
    let (near, far) = LoopbackTransport::create_pair(8);
    connector.push_transport(near).await;

    let (manager, mut events) = ConnectionManager::new(connector, config());

    // Queue before the link is even up.
    let (id_a, event_a) = message_event();
    let (id_b, event_b) = message_event();
    manager.send(event_a).await.expect("buffered send");
    manager.send(event_b).await.expect("buffered send");
    assert_eq!(manager.queued().await, 2);

    manager.connect();
    wait_for_status(&manager, LinkStatus::Connected).await;

    // Both frames arrive in send order.
    for expected in [id_a, id_b] {
        let frame = far.recv().await.expect("flushed frame");
        match codec::decode(&frame).expect("decode") {
            WireEvent::Message { message, .. } => assert_eq!(message.id, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(manager.queued().await, 0);

    // Each flushed message earns a delivered ack.
    let mut delivered = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Delivered { message_id } = event {
            delivered.push(message_id);
        }
    }
    assert_eq!(delivered, vec![id_a, id_b]);
}

#[tokio::test]
async fn new_sends_never_overtake_buffered_messages() {
    let connector = ScriptedConnector::new();
    connector.push_failure().await;
    let (near, far) = LoopbackTransport::create_pair(8);
    connector.push_transport(near).await;

    let (manager, _events) = ConnectionManager::new(connector, config());

    // Two messages queued before the link comes up.
    let (id_a, event_a) = message_event();
    let (id_b, event_b) = message_event();
    manager.send(event_a).await.expect("buffered send");
    manager.send(event_b).await.expect("buffered send");

    // Fire a third the moment the dial cycle starts; whether it lands
    // during or after the flush, the relay must see send order.
    manager.connect();
    let (id_c, event_c) = message_event();
    manager.send(event_c).await.expect("send during reconnect");

    for expected in [id_a, id_b, id_c] {
        let frame = tokio::time::timeout(Duration::from_secs(5), far.recv())
            .await
            .expect("recv timed out")
            .expect("frame");
        match codec::decode(&frame).expect("decode") {
            WireEvent::Message { message, .. } => assert_eq!(message.id, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn full_queue_rejects_rather_than_drops() {
    let connector = ScriptedConnector::new();
    let (manager, _events) = ConnectionManager::new(connector, config());

    for _ in 0..8 {
        let (_, event) = message_event();
        manager.send(event).await.expect("buffered send");
    }
    let (_, event) = message_event();
    let result = manager.send(event).await;
    assert!(matches!(result, Err(SendError::TransportUnavailable)));
    assert_eq!(manager.queued().await, 8);
}

#[tokio::test]
async fn going_offline_fails_buffered_messages() {
    let connector = ScriptedConnector::new(); // every dial fails

    let (manager, mut events) = ConnectionManager::new(connector, config());
    let (id, event) = message_event();
    manager.send(event).await.expect("buffered send");

    manager.connect();

    // Await the terminal Link(Offline) on the event channel; the status
    // field starts at Offline, so polling it can win a race against the
    // supervise task ever running.
    let mut failed = Vec::new();
    loop {
        match events.recv().await.expect("event channel open") {
            SessionEvent::SendFailed { message_id } => failed.push(message_id),
            SessionEvent::Link(LinkStatus::Offline) => break,
            _ => {}
        }
    }
    assert_eq!(failed, vec![id]);
    assert_eq!(manager.queued().await, 0);
}
