//! Tagged wire events exchanged over the persistent relay connection.
//!
//! Every frame on the wire is a single JSON object carrying a `"type"`
//! tag that identifies the event kind before further processing.

use serde::{Deserialize, Serialize};

use crate::message::{ChatId, MessageId, UserId, WireMessage};

/// A wire event, externally tagged on the `"type"` field.
///
/// Outbound traffic is `Message` and `Typing`; the relay fans inbound
/// `Message`, `Typing`, `MessageRead`, and `Presence` events back to
/// subscribed participants. Kinds unknown to this enum are rejected by
/// the codec with [`crate::codec::CodecError::UnknownKind`] so the
/// receive loop can log and skip them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireEvent {
    /// A chat message scoped to a conversation.
    #[serde(rename_all = "camelCase")]
    Message {
        /// The conversation the message belongs to.
        chat_id: ChatId,
        /// The message body.
        message: WireMessage,
    },
    /// A participant started or stopped typing.
    #[serde(rename_all = "camelCase")]
    Typing {
        /// The participant whose keyboard state changed.
        user_id: UserId,
        /// Whether the participant is currently typing.
        is_typing: bool,
    },
    /// A read receipt for a single message.
    #[serde(rename_all = "camelCase")]
    MessageRead {
        /// The message that was read.
        message_id: MessageId,
    },
    /// A participant's availability changed.
    #[serde(rename_all = "camelCase")]
    Presence {
        /// The participant whose availability changed.
        user_id: UserId,
        /// Whether the participant is online.
        online: bool,
    },
}

impl WireEvent {
    /// Returns the wire tag for this event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::MessageRead { .. } => "messageRead",
            Self::Presence { .. } => "presence",
        }
    }
}
