//! Handshake error taxonomy and WebSocket close codes.

use crate::rooms::DirectoryError;

/// Close code sent when the handshake carried no usable identity.
pub const CLOSE_MISSING_IDENTITY: u16 = 4001;
/// Close code sent when the requested room does not exist.
pub const CLOSE_ROOM_NOT_FOUND: u16 = 4003;
/// Close code sent when the room directory lookup itself failed.
pub const CLOSE_DIRECTORY_FAILURE: u16 = 4500;

/// Why a connection handshake was rejected.
///
/// All variants are non-retryable for the same handshake input: the client
/// must resupply identity or pick a different room. None of them is
/// process-fatal; the failure is scoped to the one connection.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// `user_id` or `nickname` was empty after header and query fallback.
    #[error("missing identity: user_id and nickname are required")]
    MissingIdentity,

    /// The supplied room identifier has no record in the directory.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// The room directory lookup failed (not the same as "not found").
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl HandshakeError {
    /// The WebSocket close code for this rejection cause.
    ///
    /// Codes are distinct per cause so a client can tell identity problems
    /// apart from room problems without parsing the reason text.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::MissingIdentity => CLOSE_MISSING_IDENTITY,
            Self::RoomNotFound(_) => CLOSE_ROOM_NOT_FOUND,
            Self::Directory(_) => CLOSE_DIRECTORY_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_are_distinct() {
        let codes = [
            HandshakeError::MissingIdentity.close_code(),
            HandshakeError::RoomNotFound("9".into()).close_code(),
            HandshakeError::Directory(DirectoryError::Lookup("down".into())).close_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn close_codes_are_in_the_private_range() {
        // 4000-4999 is the application-reserved WebSocket close code range.
        assert!((4000..5000).contains(&CLOSE_MISSING_IDENTITY));
        assert!((4000..5000).contains(&CLOSE_ROOM_NOT_FOUND));
        assert!((4000..5000).contains(&CLOSE_DIRECTORY_FAILURE));
    }

    #[test]
    fn display_names_the_cause() {
        let err = HandshakeError::RoomNotFound("999".into());
        assert!(err.to_string().contains("999"));

        let err = HandshakeError::MissingIdentity;
        assert!(err.to_string().contains("user_id"));
    }
}
