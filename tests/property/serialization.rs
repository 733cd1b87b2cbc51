//! Property-based wire codec tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `WireEvent` survives an encode → decode round-trip.
//! 2. Arbitrary text never causes a panic in `decode` (returns `Err`
//!    gracefully).
//! 3. Well-formed JSON with an unrecognized `type` tag is classified as
//!    `UnknownKind`, never `Malformed`.

use proptest::prelude::*;
use uuid::Uuid;

use parley_proto::codec::{self, CodecError};
use parley_proto::event::WireEvent;
use parley_proto::message::{ChatId, DeliveryStatus, MessageId, Timestamp, UserId, WireMessage};

// --- Strategies for protocol types ---

fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u128>().prop_map(|n| MessageId::from_uuid(Uuid::from_u128(n)))
}

fn arb_chat_id() -> impl Strategy<Value = ChatId> {
    any::<u128>().prop_map(|n| ChatId::from_uuid(Uuid::from_u128(n)))
}

fn arb_user_id() -> impl Strategy<Value = UserId> {
    any::<u128>().prop_map(|n| UserId::from_uuid(Uuid::from_u128(n)))
}

fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

fn arb_status() -> impl Strategy<Value = DeliveryStatus> {
    prop_oneof![
        Just(DeliveryStatus::Sent),
        Just(DeliveryStatus::Delivered),
        Just(DeliveryStatus::Read),
        Just(DeliveryStatus::Failed),
    ]
}

/// Non-empty text within the wire size limit.
fn arb_text() -> impl Strategy<Value = String> {
    "[^\x00]{1,512}"
}

fn arb_wire_message() -> impl Strategy<Value = WireMessage> {
    (
        arb_message_id(),
        arb_text(),
        arb_user_id(),
        arb_timestamp(),
        arb_status(),
    )
        .prop_map(|(id, text, sender, timestamp, status)| WireMessage {
            id,
            text,
            sender,
            timestamp,
            status,
        })
}

fn arb_wire_event() -> impl Strategy<Value = WireEvent> {
    prop_oneof![
        (arb_chat_id(), arb_wire_message())
            .prop_map(|(chat_id, message)| WireEvent::Message { chat_id, message }),
        (arb_user_id(), any::<bool>())
            .prop_map(|(user_id, is_typing)| WireEvent::Typing { user_id, is_typing }),
        arb_message_id().prop_map(|message_id| WireEvent::MessageRead { message_id }),
        (arb_user_id(), any::<bool>())
            .prop_map(|(user_id, online)| WireEvent::Presence { user_id, online }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid WireEvent survives an encode → decode round-trip.
    #[test]
    fn wire_event_round_trip(event in arb_wire_event()) {
        let frame = codec::encode(&event).expect("encode should succeed");
        let decoded = codec::decode(&frame).expect("decode should succeed");
        prop_assert_eq!(event, decoded);
    }

    /// Arbitrary text never causes a panic when decoded — it returns
    /// Err gracefully.
    #[test]
    fn arbitrary_text_decode_no_panic(frame in ".{0,512}") {
        // We don't care if it returns Ok or Err, just that it doesn't panic.
        let _ = codec::decode(&frame);
    }

    /// A well-formed object with an unrecognized tag is classified as
    /// UnknownKind (skippable), never Malformed (dropped with a warning).
    #[test]
    fn unknown_tags_are_classified_as_unknown(kind in "[a-zA-Z][a-zA-Z0-9]{0,24}") {
        prop_assume!(!["message", "typing", "messageRead", "presence"].contains(&kind.as_str()));
        let frame = format!(r#"{{"type":"{kind}"}}"#);
        match codec::decode(&frame) {
            Err(CodecError::UnknownKind(k)) => prop_assert_eq!(k, kind),
            other => prop_assert!(false, "expected UnknownKind, got {:?}", other),
        }
    }
}
