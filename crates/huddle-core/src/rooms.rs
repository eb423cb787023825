//! Room resolution against the external room record store.
//!
//! The relay never owns room records; it only needs to turn an optional
//! room identifier from the handshake path into a group name. The record
//! store sits behind [`RoomDirectory`] — in production an HTTP or database
//! client, in this repo and its tests an in-memory map.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;

/// Group joined when the handshake carries no room identifier.
pub const DEFAULT_GROUP: &str = "general_chat";

/// A room record as the external store exposes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Store-assigned room identifier.
    pub id: String,
    /// Human-readable room title.
    #[serde(default)]
    pub name: String,
}

impl Room {
    /// The broadcast group for this room — a stable string derived from
    /// the room's identity alone.
    pub fn group_name(&self) -> String {
        format!("room.{}", self.id)
    }
}

/// Error from the room record store itself.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The lookup could not be performed (store unreachable, bad reply).
    #[error("room lookup failed: {0}")]
    Lookup(String),
}

/// Read-only boundary to the external room record store.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Fetch a room record by identifier. `Ok(None)` means the store
    /// answered and the room does not exist.
    async fn get_room(&self, id: &str) -> Result<Option<Room>, DirectoryError>;
}

/// Resolve an optional room identifier to a group name.
///
/// No identifier selects [`DEFAULT_GROUP`]. An identifier must name an
/// existing room; otherwise the handshake fails with
/// [`HandshakeError::RoomNotFound`]. Resolution happens once per
/// connection, before group registration.
pub async fn resolve_group(
    directory: &dyn RoomDirectory,
    room_id: Option<&str>,
) -> Result<String, HandshakeError> {
    let Some(id) = room_id else {
        return Ok(DEFAULT_GROUP.to_owned());
    };

    match directory.get_room(id).await? {
        Some(room) => Ok(room.group_name()),
        None => Err(HandshakeError::RoomNotFound(id.to_owned())),
    }
}

/// Process-local [`RoomDirectory`] backed by a guarded map.
#[derive(Default)]
pub struct InMemoryRoomDirectory {
    rooms: RwLock<HashMap<String, Room>>,
}

impl InMemoryRoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-populated with `rooms`.
    pub fn from_rooms<I>(rooms: I) -> Self
    where
        I: IntoIterator<Item = Room>,
    {
        let map = rooms
            .into_iter()
            .map(|room| (room.id.clone(), room))
            .collect();
        Self {
            rooms: RwLock::new(map),
        }
    }

    /// Insert or replace a room record.
    pub fn insert(&self, room: Room) {
        let _ = self.rooms.write().insert(room.id.clone(), room);
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn get_room(&self, id: &str) -> Result<Option<Room>, DirectoryError> {
        Ok(self.rooms.read().get(id).cloned())
    }
}
