//! `Parley` — client-side conversation engine for the portal messenger.
//!
//! Owns the live relay connection, the per-message delivery lifecycle,
//! presence/typing tracking, and the in-memory [`index::ConversationIndex`]
//! that the rendering layer queries.

pub mod config;
pub mod connection;
pub mod delivery;
pub mod index;
pub mod model;
pub mod presence;
pub mod roster;
pub mod session;
pub mod transport;
