//! Shared protocol definitions for the `Parley` relay wire format.

pub mod codec;
pub mod event;
pub mod message;
