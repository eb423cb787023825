//! Per-connection state for one WebSocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use huddle_core::Identity;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Represents a connected, joined WebSocket client.
///
/// The connection owns its [`Identity`] for its whole lifetime; the group
/// registry holds only an `Arc` keyed by [`ClientConnection::id`].
pub struct ClientConnection {
    /// Unique connection ID (UUIDv7).
    pub id: String,
    /// Identity established at handshake. Immutable.
    pub identity: Identity,
    /// The single group this connection belongs to.
    pub group: String,
    /// Send channel to the connection's socket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
    /// Set by the first teardown; guards against a double leave broadcast.
    torn_down: AtomicBool,
}

impl ClientConnection {
    /// Create a new connection with a fresh ID.
    pub fn new(identity: Identity, group: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::now_v7().to_string(),
            identity,
            group,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Enqueue a serialized event for the write task.
    ///
    /// Returns `false` if the channel is full or closed, and increments the
    /// dropped-message counter. Never blocks: a slow receiver must not stall
    /// fan-out to the rest of the group.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Claim the right to run teardown.
    ///
    /// Returns `true` exactly once per connection, no matter how many
    /// close signals race (transport error vs. explicit close vs. server
    /// shutdown).
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity(nickname: &str) -> Identity {
        Identity {
            user_id: format!("uid-{nickname}"),
            nickname: nickname.to_owned(),
            email: format!("{nickname}@x.com"),
            profile_url: String::new(),
        }
    }

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = ClientConnection::new(test_identity("alice"), "general_chat".into(), tx);
        (conn, rx)
    }

    #[test]
    fn ids_are_unique() {
        let (a, _rxa) = make_connection();
        let (b, _rxb) = make_connection();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn send_delivers_to_write_task() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_counts_a_drop() {
        let (tx, rx) = mpsc::channel(8);
        let conn = ClientConnection::new(test_identity("bob"), "g".into(), tx);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_counts_a_drop() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(test_identity("bob"), "g".into(), tx);
        assert!(conn.send(Arc::new("one".into())));
        assert!(!conn.send(Arc::new("two".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn begin_teardown_claims_exactly_once() {
        let (conn, _rx) = make_connection();
        assert!(conn.begin_teardown());
        assert!(!conn.begin_teardown());
        assert!(!conn.begin_teardown());
    }

    #[test]
    fn heartbeat_alive_flag_resets_on_check() {
        let (conn, _rx) = make_connection();
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn identity_is_owned_by_the_connection() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.identity.nickname, "alice");
        assert_eq!(conn.group, "general_chat");
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection();
        let first = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > first);
    }
}
