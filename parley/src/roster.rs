//! Collaborator interfaces for identity and conversation bootstrap.
//!
//! The session queries these once at startup; they are read-only from
//! this subsystem's point of view. Account management, auth and profile
//! editing live elsewhere.

use parley_proto::message::UserId;

use crate::model::Chat;

/// The local user's identity, as established by the outer application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The local user.
    pub user_id: UserId,
    /// Display name for rendering.
    pub display_name: String,
    /// Opaque avatar reference.
    pub avatar_url: Option<String>,
}

/// Source of the local identity.
pub trait IdentityProvider: Send + Sync {
    /// The identity to run the session as.
    fn identity(&self) -> Identity;
}

/// Source of the initial conversation list.
pub trait RosterProvider: Send + Sync {
    /// Conversations to seed the index with, in no particular order.
    fn chats(&self) -> Vec<Chat>;
}

/// Fixed identity and chat list, for tests and demos.
#[derive(Debug, Clone)]
pub struct StaticRoster {
    identity: Identity,
    chats: Vec<Chat>,
}

impl StaticRoster {
    /// Creates a roster with a fixed identity and chat list.
    #[must_use]
    pub const fn new(identity: Identity, chats: Vec<Chat>) -> Self {
        Self { identity, chats }
    }
}

impl IdentityProvider for StaticRoster {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }
}

impl RosterProvider for StaticRoster {
    fn chats(&self) -> Vec<Chat> {
        self.chats.clone()
    }
}
