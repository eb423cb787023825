//! Broadcast event wire shapes and inbound payload decoding.
//!
//! Outbound events are a closed tagged set: adding a kind is a protocol
//! version change. Inbound payloads are decoded permissively — a payload
//! that is not a JSON object degrades to a raw-text chat message rather
//! than failing the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound kind assumed when a payload carries no explicit `type`.
pub const DEFAULT_INBOUND_KIND: &str = "chat.message";

/// An event fanned out to every member of a group.
///
/// Events are transient: they exist only for the duration of the publish
/// call and are never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BroadcastEvent {
    /// A user joined the group.
    #[serde(rename = "chat.user.join")]
    UserJoin {
        /// Display name of the joining user.
        username: String,
    },

    /// A user left the group.
    #[serde(rename = "chat.user.leave")]
    UserLeave {
        /// Display name of the leaving user.
        username: String,
    },

    /// A relayed chat message. Sender fields always come from the relaying
    /// connection's own identity, never from the client payload.
    #[serde(rename = "chat.message")]
    Message {
        /// Message body — string or structured payload, relayed as-is.
        message: Value,
        /// Sender email address (may be empty).
        sender: String,
        /// Sender display name.
        nickname: String,
        /// Sender avatar URL (may be empty).
        profile_picture_url: String,
    },
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundPayload {
    /// A chat message to republish to the group.
    Chat {
        /// Message body taken from the `message` field, or the whole
        /// object when no `message` field is present.
        message: Value,
    },

    /// The frame was not a JSON object; relay the raw text as the message
    /// body (best-effort plain-text fallback).
    RawText {
        /// The undecodable frame, verbatim.
        text: String,
    },

    /// An explicit `type` this relay does not recognize. Dropped by the
    /// session with a diagnostic; never reaches the group.
    Unrecognized {
        /// The offending `type` value.
        kind: String,
    },
}

/// Decode one inbound text frame.
///
/// A JSON object with `type: "chat.message"` (or no `type` at all) is a
/// chat message; its body is the `message` field when present, otherwise
/// the whole object. Any other `type` is [`InboundPayload::Unrecognized`].
/// Anything that does not parse as a JSON object falls back to
/// [`InboundPayload::RawText`].
pub fn decode_inbound(text: &str) -> InboundPayload {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text) else {
        return InboundPayload::RawText {
            text: text.to_owned(),
        };
    };

    let kind = match obj.get("type") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        // A non-string `type` is still an explicit (and unusable) kind.
        Some(other) => Some(other.to_string()),
    };
    if let Some(kind) = kind {
        if kind != DEFAULT_INBOUND_KIND {
            return InboundPayload::Unrecognized { kind };
        }
    }

    let message = match obj.get("message") {
        Some(message) => message.clone(),
        None => Value::Object(obj),
    };
    InboundPayload::Chat { message }
}
