//! Integration tests for the outbound message lifecycle.
//!
//! Covers the full path from `send_message` through the connection
//! manager to the relay, the local delivered acknowledgment, inbound
//! read receipts, and inbound messages from the counterpart.
//!
//! Verification command: `cargo test --test message_lifecycle`

use std::time::Duration;

use parley::config::ClientConfig;
use parley::model::{Chat, Member, Role};
use parley::roster::{Identity, StaticRoster};
use parley::session::Session;
use parley::transport::Transport;
use parley::transport::loopback::{LoopbackTransport, ScriptedConnector};
use parley_proto::codec;
use parley_proto::event::WireEvent;
use parley_proto::message::{ChatId, DeliveryStatus, MessageId, Timestamp, UserId, WireMessage};

// =============================================================================
// Test helpers
// =============================================================================

/// Boots a session over a loopback transport. The returned far side
/// plays the relay: frames the client sends arrive there, and frames
/// pushed into it are received by the client.
async fn start_session() -> (Session<ScriptedConnector>, LoopbackTransport, ChatId, UserId) {
    let identity = Identity {
        user_id: UserId::new(),
        display_name: "Me".into(),
        avatar_url: None,
    };
    let counterpart = Member {
        user_id: UserId::new(),
        display_name: "Alice".into(),
        role: Role::Member,
    };
    let counterpart_id = counterpart.user_id;
    let chat = Chat::direct(ChatId::new(), "Alice", counterpart);
    let chat_id = chat.id;
    let roster = StaticRoster::new(identity, vec![chat]);

    let connector = ScriptedConnector::new();
    let (near, far) = LoopbackTransport::create_pair(32);
    connector.push_transport(near).await;

    let config = ClientConfig {
        backoff_initial: Duration::from_millis(10),
        backoff_ceiling: Duration::from_millis(40),
        ..Default::default()
    };
    let session = Session::start(&roster, &roster, connector, &config);
    (session, far, chat_id, counterpart_id)
}

/// Polls the session until the predicate holds or a timeout expires.
async fn wait_until<C, F>(session: &Session<C>, mut predicate: F)
where
    C: parley::transport::Connector,
    F: FnMut(&mut parley::index::ConversationIndex) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if session.with_index(&mut predicate) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within timeout"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn status_of<C: parley::transport::Connector>(
    session: &Session<C>,
    chat_id: ChatId,
    message_id: MessageId,
) -> DeliveryStatus {
    session.with_index(|index| {
        index
            .messages(&chat_id)
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.status)
            .expect("message present")
    })
}

/// Pushes an inbound wire event to the client, as the relay would.
async fn inject(far: &LoopbackTransport, event: &WireEvent) {
    let frame = codec::encode(event).expect("encode");
    far.send(&frame).await.expect("inject frame");
}

// =============================================================================
// Outbound lifecycle
// =============================================================================

#[tokio::test]
async fn sent_message_reaches_relay_and_becomes_delivered() {
    let (session, far, chat_id, _) = start_session().await;

    let id = session
        .send_message(chat_id, "hello".into(), None)
        .expect("send");

    // The relay sees exactly the message we sent.
    let frame = far.recv().await.expect("relay frame");
    let event = codec::decode(&frame).expect("decode");
    match event {
        WireEvent::Message { chat_id: wire_chat, message } => {
            assert_eq!(wire_chat, chat_id);
            assert_eq!(message.id, id);
            assert_eq!(message.text, "hello");
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The local network ack advances Sent -> Delivered.
    wait_until(&session, |index| {
        index
            .messages(&chat_id)
            .iter()
            .any(|m| m.id == id && m.status == DeliveryStatus::Delivered)
    })
    .await;

    session.close().await;
}

#[tokio::test]
async fn read_receipt_advances_to_read() {
    let (session, far, chat_id, _) = start_session().await;

    let id = session
        .send_message(chat_id, "hello".into(), None)
        .expect("send");
    let _ = far.recv().await.expect("relay frame");

    wait_until(&session, |index| {
        index.messages(&chat_id)[0].status == DeliveryStatus::Delivered
    })
    .await;

    inject(&far, &WireEvent::MessageRead { message_id: id }).await;
    wait_until(&session, |index| {
        index.messages(&chat_id)[0].status == DeliveryStatus::Read
    })
    .await;

    session.close().await;
}

#[tokio::test]
async fn read_before_delivered_jumps_the_ladder() {
    let (session, far, chat_id, _) = start_session().await;

    let id = session
        .send_message(chat_id, "hello".into(), None)
        .expect("send");

    // Inject the read receipt immediately; arrival order at the apply
    // loop decides, and a later delivered ack must not regress it.
    inject(&far, &WireEvent::MessageRead { message_id: id }).await;

    wait_until(&session, |index| {
        index.messages(&chat_id)[0].status == DeliveryStatus::Read
    })
    .await;

    // Give any trailing Delivered ack time to land, then re-check.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(status_of(&session, chat_id, id), DeliveryStatus::Read);

    session.close().await;
}

#[tokio::test]
async fn duplicate_read_receipts_are_idempotent() {
    let (session, far, chat_id, _) = start_session().await;

    let id = session
        .send_message(chat_id, "hello".into(), None)
        .expect("send");
    let _ = far.recv().await.expect("relay frame");

    for _ in 0..3 {
        inject(&far, &WireEvent::MessageRead { message_id: id }).await;
    }
    wait_until(&session, |index| {
        index.messages(&chat_id)[0].status == DeliveryStatus::Read
    })
    .await;

    session.close().await;
}

#[tokio::test]
async fn rapid_sends_keep_order_and_unique_ids() {
    let (session, far, chat_id, _) = start_session().await;

    let a = session.send_message(chat_id, "one".into(), None).expect("send");
    let b = session.send_message(chat_id, "two".into(), None).expect("send");
    let c = session.send_message(chat_id, "three".into(), None).expect("send");
    assert_ne!(a, b);
    assert_ne!(b, c);

    // The relay receives them in append order.
    for expected in [a, b, c] {
        let frame = far.recv().await.expect("relay frame");
        match codec::decode(&frame).expect("decode") {
            WireEvent::Message { message, .. } => assert_eq!(message.id, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }

    session.close().await;
}

// =============================================================================
// Inbound messages
// =============================================================================

#[tokio::test]
async fn inbound_message_lands_delivered_with_unread() {
    let (session, far, chat_id, counterpart) = start_session().await;

    let id = MessageId::new();
    inject(
        &far,
        &WireEvent::Message {
            chat_id,
            message: WireMessage {
                id,
                text: "hey there".into(),
                sender: counterpart,
                timestamp: Timestamp::now(),
                status: DeliveryStatus::Sent,
            },
        },
    )
    .await;

    wait_until(&session, |index| !index.messages(&chat_id).is_empty()).await;

    session.with_index(|index| {
        let msg = &index.messages(&chat_id)[0];
        assert_eq!(msg.id, id);
        assert!(!msg.outbound);
        assert_eq!(msg.status, DeliveryStatus::Delivered);

        let chat = index.chat(&chat_id).expect("chat");
        assert_eq!(chat.unread, 1);
        assert_eq!(chat.last_message.as_ref().expect("summary").text, "hey there");
    });

    session.close().await;
}

#[tokio::test]
async fn unknown_frames_do_not_break_the_stream() {
    let (session, far, chat_id, counterpart) = start_session().await;

    // An event kind this client does not know, then garbage.
    far.send(r#"{"type":"reactionAdded","messageId":"x"}"#)
        .await
        .expect("inject unknown");
    far.send("not json at all").await.expect("inject garbage");

    // A well-formed message after the junk still gets through.
    inject(
        &far,
        &WireEvent::Message {
            chat_id,
            message: WireMessage {
                id: MessageId::new(),
                text: "still alive".into(),
                sender: counterpart,
                timestamp: Timestamp::now(),
                status: DeliveryStatus::Sent,
            },
        },
    )
    .await;

    wait_until(&session, |index| !index.messages(&chat_id).is_empty()).await;
    session.close().await;
}
