//! Identity extraction from connection handshake metadata.
//!
//! The upstream gateway authenticates the user and injects identity as
//! `x-user-id` / `x-nickname` / `x-email` / `x-profile-url` headers. Clients
//! that cannot set headers (browser `WebSocket`) pass the same fields as
//! query parameters instead; the query only fills fields the headers left
//! empty.

use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;

/// Identity attributes established once at handshake, immutable for the
/// connection's lifetime. Never persisted by the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier. Required.
    pub user_id: String,
    /// Display name used in join/leave/message events. Required.
    pub nickname: String,
    /// Sender address attached to message events. Optional, defaults empty.
    pub email: String,
    /// Avatar URL attached to message events. Optional, defaults empty.
    pub profile_url: String,
}

/// Extract an [`Identity`] from header-like metadata with a query fallback.
///
/// Header values are decoded permissively: invalid UTF-8 is replaced, never
/// fatal. The query is parsed as `key=value` pairs joined by `&`; entries
/// without `=` are ignored and values are taken verbatim. Query values fill
/// only fields the headers left empty.
///
/// Fails with [`HandshakeError::MissingIdentity`] when `user_id` or
/// `nickname` is still empty after the fallback.
pub fn extract<'a, I>(headers: I, query: &str) -> Result<Identity, HandshakeError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut user_id = String::new();
    let mut nickname = String::new();
    let mut email = String::new();
    let mut profile_url = String::new();

    for (name, value) in headers {
        let target = match name {
            "x-user-id" => &mut user_id,
            "x-nickname" => &mut nickname,
            "x-email" => &mut email,
            "x-profile-url" => &mut profile_url,
            _ => continue,
        };
        *target = String::from_utf8_lossy(value).into_owned();
    }

    if user_id.is_empty() || nickname.is_empty() {
        for (key, value) in parse_query(query) {
            let target = match key {
                "user_id" => &mut user_id,
                "nickname" => &mut nickname,
                "email" => &mut email,
                "profile_url" => &mut profile_url,
                _ => continue,
            };
            if target.is_empty() {
                *target = value.to_owned();
            }
        }
    }

    if user_id.is_empty() || nickname.is_empty() {
        return Err(HandshakeError::MissingIdentity);
    }

    Ok(Identity {
        user_id,
        nickname,
        email,
        profile_url,
    })
}

/// Split a query string into `key=value` pairs, skipping entries without `=`.
fn parse_query(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query.split('&').filter_map(|pair| pair.split_once('='))
}
