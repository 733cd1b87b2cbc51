//! Conversation index: the single source of truth for chats, messages
//! and their rendering state.
//!
//! Every operation is synchronous and non-suspending; multi-threaded
//! callers (the session) wrap the whole index in one
//! `parking_lot::Mutex` so each inbound event is applied atomically.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;

use parley_proto::event::WireEvent;
use parley_proto::message::{
    ChatId, DeliveryStatus, MessageId, Timestamp, UserId, ValidationError, WireMessage, validate,
};

use crate::connection::SessionEvent;
use crate::delivery;
use crate::model::{Attachment, Chat, ChatPresence, LastMessage, Message};
use crate::presence::PresenceTracker;

/// Errors returned by index mutations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The chat does not exist (or was removed).
    #[error("unknown chat {0}")]
    UnknownChat(ChatId),

    /// The message text failed validation.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),
}

/// One row of the conversation list, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    /// The conversation.
    pub chat_id: ChatId,
    /// Display name.
    pub name: String,
    /// Newest message, if any.
    pub last_message: Option<LastMessage>,
    /// Unread counter.
    pub unread: u32,
    /// Pinned to the top of the list.
    pub pinned: bool,
    /// Notifications suppressed.
    pub muted: bool,
    /// Live availability indicator.
    pub presence: ChatPresence,
}

/// In-memory conversation state for one session.
pub struct ConversationIndex {
    chats: HashMap<ChatId, Chat>,
    messages: HashMap<ChatId, Vec<Message>>,
    /// Which chat owns each known message, for status routing.
    routes: HashMap<MessageId, ChatId>,
    selected: Option<ChatId>,
    presence: PresenceTracker,
    /// Hand-off channel to the connection manager's outbound pump.
    outbound: mpsc::Sender<WireEvent>,
    self_id: UserId,
}

impl ConversationIndex {
    /// Creates an empty index for the given local user.
    #[must_use]
    pub fn new(self_id: UserId, presence: PresenceTracker, outbound: mpsc::Sender<WireEvent>) -> Self {
        Self {
            chats: HashMap::new(),
            messages: HashMap::new(),
            routes: HashMap::new(),
            selected: None,
            presence,
            outbound,
            self_id,
        }
    }

    /// Registers a conversation. Replaces an existing entry with the
    /// same id but keeps its messages.
    pub fn insert_chat(&mut self, chat: Chat) {
        self.messages.entry(chat.id).or_default();
        self.chats.insert(chat.id, chat);
    }

    /// Creates and dispatches an outbound message.
    ///
    /// Allocates a fresh id, appends the message in `Sent` status,
    /// updates the last-message summary, and hands the wire event to
    /// the connection manager. Append order equals send order, so rapid
    /// successive calls stay consistent. If the outbound channel is
    /// full the message is marked `Failed` immediately; the id is still
    /// returned and the failure is visible through the message state.
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownChat`] for a missing or removed chat,
    /// [`IndexError::Validation`] for empty or oversized text.
    pub fn create_message(
        &mut self,
        chat_id: ChatId,
        text: String,
        attachment: Option<Attachment>,
    ) -> Result<MessageId, IndexError> {
        if !self.chats.contains_key(&chat_id) {
            return Err(IndexError::UnknownChat(chat_id));
        }
        validate(&text)?;

        let message = Message::outbound(MessageId::new(), text, attachment);
        let id = message.id;
        let wire = WireEvent::Message {
            chat_id,
            message: WireMessage {
                id,
                text: message.text.clone(),
                sender: self.self_id,
                timestamp: message.timestamp,
                status: DeliveryStatus::Sent,
            },
        };

        self.touch_last_message(chat_id, &message.text, message.timestamp);
        self.routes.insert(id, chat_id);
        self.messages.entry(chat_id).or_default().push(message);

        if let Err(e) = self.outbound.try_send(wire) {
            tracing::warn!(message_id = %id, err = %e, "outbound channel full, failing message");
            self.transition(id, DeliveryStatus::Failed);
        }
        Ok(id)
    }

    /// Applies one session event atomically.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Wire(WireEvent::Message { chat_id, message }) => {
                self.apply_inbound_message(chat_id, message);
            }
            SessionEvent::Wire(WireEvent::MessageRead { message_id }) => {
                self.transition(message_id, DeliveryStatus::Read);
            }
            SessionEvent::Delivered { message_id } => {
                self.transition(message_id, DeliveryStatus::Delivered);
            }
            SessionEvent::SendFailed { message_id } => {
                self.transition(message_id, DeliveryStatus::Failed);
            }
            SessionEvent::Wire(WireEvent::Typing { user_id, is_typing }) => {
                let now = Instant::now();
                for chat_id in self.chats_of(&user_id) {
                    self.presence.apply_typing(chat_id, user_id, is_typing, now);
                }
            }
            SessionEvent::Wire(WireEvent::Presence { user_id, online }) => {
                let now = Timestamp::now();
                for chat_id in self.chats_of(&user_id) {
                    self.presence.apply_presence(chat_id, online);
                    if let Some(chat) = self.chats.get_mut(&chat_id) {
                        chat.last_seen = Some(now);
                    }
                }
            }
            // Link status is surfaced by the session handle directly.
            SessionEvent::Link(_) => {}
        }
    }

    /// Opens a chat; its unread counter is zeroed immediately.
    pub fn select_chat(&mut self, chat_id: ChatId) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.unread = 0;
            self.selected = Some(chat_id);
        }
    }

    /// Closes the open chat, if any.
    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Currently open chat.
    #[must_use]
    pub const fn selected(&self) -> Option<ChatId> {
        self.selected
    }

    /// Suppresses or restores notifications for a chat.
    pub fn set_muted(&mut self, chat_id: ChatId, muted: bool) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.muted = muted;
        }
    }

    /// Hides or restores a chat in the main list.
    pub fn set_archived(&mut self, chat_id: ChatId, archived: bool) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.archived = archived;
        }
    }

    /// Pins or unpins a chat at the top of the list.
    pub fn set_pinned(&mut self, chat_id: ChatId, pinned: bool) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.pinned = pinned;
        }
    }

    /// Removes a chat, its messages, routing entries and presence state
    /// as a unit. Late events for the removed chat are ignored and never
    /// resurrect it.
    pub fn remove_chat(&mut self, chat_id: ChatId) {
        self.chats.remove(&chat_id);
        self.messages.remove(&chat_id);
        self.routes.retain(|_, owner| *owner != chat_id);
        self.presence.remove_chat(&chat_id);
        if self.selected == Some(chat_id) {
            self.selected = None;
        }
    }

    /// Conversation list rows: pinned chats first, then by most recent
    /// activity; archived chats are excluded.
    #[must_use]
    pub fn summaries(&self) -> Vec<ChatSummary> {
        let now = Instant::now();
        let mut rows: Vec<ChatSummary> = self
            .chats
            .values()
            .filter(|chat| !chat.archived)
            .map(|chat| ChatSummary {
                chat_id: chat.id,
                name: chat.name.clone(),
                last_message: chat.last_message.clone(),
                unread: chat.unread,
                pinned: chat.pinned,
                muted: chat.muted,
                presence: self.presence.status(&chat.id, now),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.pinned.cmp(&a.pinned).then_with(|| {
                let a_ts = a.last_message.as_ref().map(|m| m.timestamp.as_millis());
                let b_ts = b.last_message.as_ref().map(|m| m.timestamp.as_millis());
                b_ts.cmp(&a_ts)
            })
        });
        rows
    }

    /// Messages of a chat in append order, empty for unknown chats.
    #[must_use]
    pub fn messages(&self, chat_id: &ChatId) -> &[Message] {
        self.messages.get(chat_id).map_or(&[], Vec::as_slice)
    }

    /// A chat by id.
    #[must_use]
    pub fn chat(&self, chat_id: &ChatId) -> Option<&Chat> {
        self.chats.get(chat_id)
    }

    /// Live availability of a chat, typing overlay included.
    #[must_use]
    pub fn presence_of(&self, chat_id: &ChatId) -> ChatPresence {
        self.presence.status(chat_id, Instant::now())
    }

    /// Expires stale typing overlays.
    pub fn sweep_typing(&mut self) {
        self.presence.sweep(Instant::now());
    }

    fn apply_inbound_message(&mut self, chat_id: ChatId, wire: WireMessage) {
        // Deleted or never-known chats stay gone.
        if !self.chats.contains_key(&chat_id) {
            tracing::debug!(chat_id = %chat_id, "dropping message for unknown chat");
            return;
        }
        if self.routes.contains_key(&wire.id) {
            tracing::debug!(message_id = %wire.id, "dropping duplicate message");
            return;
        }

        self.touch_last_message(chat_id, &wire.text, wire.timestamp);
        self.routes.insert(wire.id, chat_id);
        let message = Message::inbound(wire.id, wire.text, wire.timestamp);
        self.messages.entry(chat_id).or_default().push(message);

        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.last_seen = Some(wire.timestamp);
            if self.selected != Some(chat_id) {
                chat.unread += 1;
            }
        }
    }

    /// Routes a status change through the delivery state machine.
    /// Unknown ids and disallowed transitions are dropped.
    fn transition(&mut self, message_id: MessageId, target: DeliveryStatus) {
        let Some(chat_id) = self.routes.get(&message_id) else {
            tracing::debug!(message_id = %message_id, status = %target, "status for unknown message");
            return;
        };
        let Some(message) = self
            .messages
            .get_mut(chat_id)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
        else {
            return;
        };
        if let Some(next) = delivery::advance(message.status, target) {
            tracing::debug!(message_id = %message_id, from = %message.status, to = %next, "delivery transition");
            message.status = next;
        }
    }

    /// Every chat a user participates in. Presence signals fan out to
    /// all of them: a group member's direct chat and the group both see
    /// the same availability.
    fn chats_of(&self, user_id: &UserId) -> Vec<ChatId> {
        self.chats
            .values()
            .filter(|chat| chat.has_member(user_id))
            .map(|chat| chat.id)
            .collect()
    }

    fn touch_last_message(&mut self, chat_id: ChatId, text: &str, timestamp: Timestamp) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.last_message = Some(LastMessage {
                text: text.to_owned(),
                timestamp,
            });
        }
    }
}
