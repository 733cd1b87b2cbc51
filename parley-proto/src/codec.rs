//! Serialization and deserialization for the `Parley` wire protocol.
//!
//! Frames are JSON text. Decoding pre-reads the `"type"` tag so that
//! well-formed frames with an unrecognized kind are distinguishable
//! from unparseable payloads — the receive loop drops both, but logs
//! them differently.

use crate::event::WireEvent;

/// Wire tags this protocol version understands.
const KNOWN_KINDS: [&str; 4] = ["message", "typing", "messageRead", "presence"];

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not valid JSON or does not match the event schema.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The frame is valid JSON but carries an unrecognized `"type"` tag.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}

/// Encodes a [`WireEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the event cannot be serialized.
pub fn encode(event: &WireEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decodes a JSON text frame into a [`WireEvent`].
///
/// # Errors
///
/// Returns [`CodecError::UnknownKind`] if the frame carries a `"type"`
/// tag outside the known set, or [`CodecError::Malformed`] if the frame
/// is not valid JSON, lacks a string `"type"` tag, or fails schema
/// validation for its kind.
pub fn decode(frame: &str) -> Result<WireEvent, CodecError> {
    let value: serde_json::Value =
        serde_json::from_str(frame).map_err(|e| CodecError::Malformed(e.to_string()))?;

    let Some(kind) = value.get("type").and_then(serde_json::Value::as_str) else {
        return Err(CodecError::Malformed("missing \"type\" tag".into()));
    };
    if !KNOWN_KINDS.contains(&kind) {
        return Err(CodecError::UnknownKind(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| CodecError::Malformed(e.to_string()))
}
