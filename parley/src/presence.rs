//! Presence and typing tracker.
//!
//! Converts inbound presence/typing events into per-conversation
//! [`ChatPresence`] status. Typing signals are ephemeral: they decay on
//! an explicit "stopped typing" event or after a bounded silence
//! window. Decay is evaluated lazily against a deadline captured at
//! signal time, so disposal has no timers to cancel.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parley_proto::message::{ChatId, UserId};

use crate::model::ChatPresence;

/// Tracks server-authoritative availability plus the typing overlay.
///
/// Base presence (`online`/`offline`) is whatever the server last
/// reported; the typing overlay wins while any entry for the chat is
/// unexpired. Conflicting signals for the same participant resolve
/// last-write-wins by arrival order, matching the per-connection
/// ordering the transport preserves.
#[derive(Debug)]
pub struct PresenceTracker {
    /// Last reported availability per chat.
    base: HashMap<ChatId, bool>,
    /// Active typing signals with their decay deadlines.
    typing: HashMap<(ChatId, UserId), Instant>,
    /// Silence window after which a typing signal decays.
    typing_timeout: Duration,
}

impl PresenceTracker {
    /// Creates a tracker with the given typing decay window.
    #[must_use]
    pub fn new(typing_timeout: Duration) -> Self {
        Self {
            base: HashMap::new(),
            typing: HashMap::new(),
            typing_timeout,
        }
    }

    /// Applies an inbound availability report for a chat.
    pub fn apply_presence(&mut self, chat_id: ChatId, online: bool) {
        self.base.insert(chat_id, online);
    }

    /// Applies an inbound typing signal.
    ///
    /// `true` marks the participant typing until `now + typing_timeout`
    /// or an explicit `false`; `false` clears immediately and reverts
    /// the chat to its last known availability.
    pub fn apply_typing(&mut self, chat_id: ChatId, user_id: UserId, is_typing: bool, now: Instant) {
        if is_typing {
            self.typing
                .insert((chat_id, user_id), now + self.typing_timeout);
        } else {
            self.typing.remove(&(chat_id, user_id));
        }
    }

    /// Resolves the presence status of a chat at the given instant.
    ///
    /// Typing wins while any overlay entry for the chat is unexpired;
    /// otherwise the last reported availability applies. Chats the
    /// server has never reported on read as offline.
    #[must_use]
    pub fn status(&self, chat_id: &ChatId, now: Instant) -> ChatPresence {
        let typing = self
            .typing
            .iter()
            .any(|((chat, _), deadline)| chat == chat_id && *deadline > now);
        if typing {
            return ChatPresence::Typing;
        }
        if self.base.get(chat_id).copied().unwrap_or(false) {
            ChatPresence::Online
        } else {
            ChatPresence::Offline
        }
    }

    /// Prunes typing entries whose decay deadline has passed.
    pub fn sweep(&mut self, now: Instant) {
        self.typing.retain(|_, deadline| *deadline > now);
    }

    /// Drops all state for a removed chat.
    pub fn remove_chat(&mut self, chat_id: &ChatId) {
        self.base.remove(chat_id);
        self.typing.retain(|(chat, _), _| chat != chat_id);
    }
}
