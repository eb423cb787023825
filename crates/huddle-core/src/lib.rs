//! # huddle-core
//!
//! Transport-independent domain types for the huddle chat relay:
//!
//! - Identity extraction from handshake metadata (headers + query fallback)
//! - Broadcast event wire shapes (`chat.user.join` / `chat.user.leave` /
//!   `chat.message`) and inbound payload decoding
//! - Room resolution against an external record store boundary
//! - The handshake error taxonomy and its close codes

#![deny(unsafe_code)]

pub mod error;
pub mod events;
pub mod identity;
pub mod rooms;

pub use error::HandshakeError;
pub use events::{BroadcastEvent, InboundPayload};
pub use identity::Identity;
pub use rooms::{Room, RoomDirectory, DEFAULT_GROUP};
