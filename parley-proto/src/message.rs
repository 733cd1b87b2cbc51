//! Identifier, timestamp, and message body types for the `Parley` wire format.
//!
//! All types in this module cross the relay connection as JSON and are
//! shared between the wire layer and the client-side conversation engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message text size in bytes (16 KiB).
pub const MAX_TEXT_SIZE: usize = 16 * 1024;

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a conversation (direct thread or group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(Uuid);

impl ChatId {
    /// Creates a new chat identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `ChatId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a participant across conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new user identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `UserId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Tracks the delivery lifecycle of an outbound message.
///
/// The three-step ladder `Sent` → `Delivered` → `Read` is monotonically
/// non-decreasing; `Failed` sits outside the ladder and is terminal,
/// reachable only from `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    /// Handed to the transport, no acknowledgment yet.
    Sent,
    /// Accepted by the relay on behalf of the recipient.
    Delivered,
    /// Read receipt received. Terminal.
    Read,
    /// The send failed outright. Terminal.
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The message body carried by a `message` wire event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique identifier, assigned by the sender before confirmation.
    pub id: MessageId,
    /// The text payload.
    pub text: String,
    /// Who sent this message.
    pub sender: UserId,
    /// When the message was created.
    pub timestamp: Timestamp,
    /// Delivery status at serialization time.
    pub status: DeliveryStatus,
}

/// Error returned when a message body fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message text is empty.
    #[error("message text is empty")]
    Empty,
    /// Message text exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the text in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates message text for sending.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if the text is empty, or
/// [`ValidationError::TooLarge`] if it exceeds [`MAX_TEXT_SIZE`].
pub const fn validate(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = text.len();
    if size > MAX_TEXT_SIZE {
        return Err(ValidationError::TooLarge {
            size,
            max: MAX_TEXT_SIZE,
        });
    }
    Ok(())
}

impl WireMessage {
    /// Validates this message body for sending.
    ///
    /// # Errors
    ///
    /// See [`validate`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(&self.text)
    }
}
