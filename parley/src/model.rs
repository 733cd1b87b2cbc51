//! Conversation and message value types.
//!
//! Pure data with invariants, no behavior: these types are mutated only
//! through the [`crate::index::ConversationIndex`], which is the sole
//! mutation surface for the conversation subsystem.

use parley_proto::message::{ChatId, DeliveryStatus, MessageId, Timestamp, UserId};

/// Kind of an attachment referenced by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    /// An inline-renderable image.
    Image,
    /// A downloadable document.
    Document,
}

/// Descriptor for a file attached to a message.
///
/// Content is referenced by an opaque URL supplied by the external
/// upload collaborator; this subsystem never touches the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// What kind of content the URL points at.
    pub kind: AttachmentKind,
    /// Original file name for display.
    pub name: String,
    /// Size of the content in bytes.
    pub byte_size: u64,
    /// Opaque, transient reference to the content.
    pub url: String,
}

/// A single emoji reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// The emoji glyph.
    pub emoji: String,
    /// The reacting participant.
    pub user_id: UserId,
    /// When the reaction was added.
    pub timestamp: Timestamp,
}

/// A message owned by exactly one conversation.
///
/// The identifier is unique within the owning conversation and assigned
/// atomically with creation. Status transitions happen in place until
/// the message reaches a terminal state, after which it is immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier within the owning conversation.
    pub id: MessageId,
    /// The text payload.
    pub text: String,
    /// Whether the local user sent this message.
    pub outbound: bool,
    /// Optional attachment descriptor.
    pub attachment: Option<Attachment>,
    /// Reactions added by participants, in arrival order.
    pub reactions: Vec<Reaction>,
    /// The message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    /// Whether the message is pinned in its conversation.
    pub pinned: bool,
    /// Delivery lifecycle state.
    pub status: DeliveryStatus,
    /// Creation time.
    pub timestamp: Timestamp,
}

impl Message {
    /// Creates a self-originated message in `Sent` status.
    #[must_use]
    pub fn outbound(id: MessageId, text: String, attachment: Option<Attachment>) -> Self {
        Self {
            id,
            text,
            outbound: true,
            attachment,
            reactions: Vec::new(),
            reply_to: None,
            pinned: false,
            status: DeliveryStatus::Sent,
            timestamp: Timestamp::now(),
        }
    }

    /// Creates a counterpart-originated message.
    ///
    /// Inbound messages have already reached this client, so they start
    /// in `Delivered` status.
    #[must_use]
    pub const fn inbound(id: MessageId, text: String, timestamp: Timestamp) -> Self {
        Self {
            id,
            text,
            outbound: false,
            attachment: None,
            reactions: Vec::new(),
            reply_to: None,
            pinned: false,
            status: DeliveryStatus::Delivered,
            timestamp,
        }
    }
}

/// Whether a conversation is a one-on-one thread or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-on-one thread with a single counterpart.
    Direct,
    /// Multi-participant thread with a member roster.
    Group,
}

/// Role of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Can manage membership.
    Admin,
    /// Regular participant.
    Member,
}

/// A participant entry in a conversation roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The participant's identity.
    pub user_id: UserId,
    /// Display name for rendering.
    pub display_name: String,
    /// Role within the conversation.
    pub role: Role,
}

/// Live availability indicator for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPresence {
    /// The counterpart is connected.
    Online,
    /// The counterpart is not connected.
    Offline,
    /// A participant is typing right now.
    Typing,
}

impl std::fmt::Display for ChatPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Typing => write!(f, "typing"),
        }
    }
}

/// Denormalized summary of the newest message, for list rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMessage {
    /// Text of the newest message.
    pub text: String,
    /// When it was created.
    pub timestamp: Timestamp,
}

/// A conversation and its denormalized rendering state.
///
/// Created when a thread is initiated and kept for the session; removal
/// goes through the index so late events cannot resurrect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    /// Unique conversation identifier.
    pub id: ChatId,
    /// Direct or group.
    pub kind: ChatKind,
    /// Display name.
    pub name: String,
    /// Opaque avatar reference for rendering.
    pub avatar_url: Option<String>,
    /// Participant roster (for direct chats: the counterpart only).
    pub members: Vec<Member>,
    /// When the counterpart was last seen active.
    pub last_seen: Option<Timestamp>,
    /// Unread message counter; zero while this chat is selected.
    pub unread: u32,
    /// Notifications suppressed.
    pub muted: bool,
    /// Hidden from the main list.
    pub archived: bool,
    /// Pinned to the top of the list.
    pub pinned: bool,
    /// Summary of the newest message.
    pub last_message: Option<LastMessage>,
}

impl Chat {
    /// Creates a direct conversation with a single counterpart.
    #[must_use]
    pub fn direct(id: ChatId, name: impl Into<String>, counterpart: Member) -> Self {
        Self::new(id, ChatKind::Direct, name, vec![counterpart])
    }

    /// Creates a group conversation with an ordered member roster.
    #[must_use]
    pub fn group(id: ChatId, name: impl Into<String>, members: Vec<Member>) -> Self {
        Self::new(id, ChatKind::Group, name, members)
    }

    fn new(id: ChatId, kind: ChatKind, name: impl Into<String>, members: Vec<Member>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            avatar_url: None,
            members,
            last_seen: None,
            unread: 0,
            muted: false,
            archived: false,
            pinned: false,
            last_message: None,
        }
    }

    /// Returns `true` if the given user participates in this chat.
    #[must_use]
    pub fn has_member(&self, user_id: &UserId) -> bool {
        self.members.iter().any(|m| m.user_id == *user_id)
    }
}
