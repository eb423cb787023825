//! Group membership registry.
//!
//! Process-wide mapping from group name to the set of currently connected
//! members. The registry is the substrate for fan-out: the dispatcher
//! snapshots a group's membership here and delivers outside the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use super::connection::ClientConnection;

/// Group name → (connection id → connection) under one async lock.
///
/// Membership exists if and only if the owning session is between its join
/// and its teardown; a torn-down connection is never left behind here.
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, HashMap<String, Arc<ClientConnection>>>>,
    /// Atomic counter tracking total members (avoids read-locking for count queries).
    member_count: AtomicUsize,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            member_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection to a group. Idempotent: joining twice leaves one
    /// membership entry and produces one delivery per broadcast.
    pub async fn join(&self, group: &str, connection: Arc<ClientConnection>) {
        let mut groups = self.groups.write().await;
        let members = groups.entry(group.to_owned()).or_default();
        if members
            .insert(connection.id.clone(), connection)
            .is_none()
        {
            let _ = self.member_count.fetch_add(1, Ordering::Relaxed);
        }
        debug!(group, members = members.len(), "group join");
    }

    /// Remove a connection from a group. Leaving a group it is not a
    /// member of (or a group that does not exist) is a no-op.
    pub async fn leave(&self, group: &str, connection_id: &str) {
        let mut groups = self.groups.write().await;
        let Some(members) = groups.get_mut(group) else {
            return;
        };
        if members.remove(connection_id).is_some() {
            let _ = self.member_count.fetch_sub(1, Ordering::Relaxed);
        }
        // Drop the entry once the last member leaves.
        if members.is_empty() {
            let _ = groups.remove(group);
        }
        debug!(group, connection_id, "group leave");
    }

    /// Snapshot the current members of a group.
    ///
    /// An absent or empty group yields an empty vec. The snapshot is taken
    /// under the read lock and handed back so delivery can happen without
    /// holding it.
    pub async fn members_of(&self, group: &str) -> Vec<Arc<ClientConnection>> {
        let groups = self.groups.read().await;
        groups
            .get(group)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total connections across all groups.
    pub fn connection_count(&self) -> usize {
        self.member_count.load(Ordering::Relaxed)
    }

    /// Number of groups with at least one member.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::Identity;
    use tokio::sync::mpsc;

    fn make_member(nickname: &str) -> Arc<ClientConnection> {
        // Receiver dropped: these tests exercise membership, not delivery.
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(ClientConnection::new(
            Identity {
                user_id: format!("uid-{nickname}"),
                nickname: nickname.to_owned(),
                email: String::new(),
                profile_url: String::new(),
            },
            "g".into(),
            tx,
        ))
    }

    #[tokio::test]
    async fn join_then_members_of() {
        let registry = GroupRegistry::new();
        let conn = make_member("alice");
        registry.join("g", conn.clone()).await;

        let members = registry.members_of("g").await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, conn.id);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = GroupRegistry::new();
        let conn = make_member("alice");
        registry.join("g", conn.clone()).await;
        registry.join("g", conn.clone()).await;

        assert_eq!(registry.members_of("g").await.len(), 1);
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn leave_removes_membership() {
        let registry = GroupRegistry::new();
        let conn = make_member("alice");
        registry.join("g", conn.clone()).await;
        registry.leave("g", &conn.id).await;

        assert!(registry.members_of("g").await.is_empty());
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn leave_of_non_member_is_a_noop() {
        let registry = GroupRegistry::new();
        let conn = make_member("alice");
        registry.join("g", conn).await;

        registry.leave("g", "no-such-id").await;
        registry.leave("other-group", "no-such-id").await;
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn double_leave_is_a_noop() {
        let registry = GroupRegistry::new();
        let conn = make_member("alice");
        registry.join("g", conn.clone()).await;
        registry.leave("g", &conn.id).await;
        registry.leave("g", &conn.id).await;
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn members_of_absent_group_is_empty() {
        let registry = GroupRegistry::new();
        assert!(registry.members_of("nowhere").await.is_empty());
    }

    #[tokio::test]
    async fn empty_group_entry_is_removed() {
        let registry = GroupRegistry::new();
        let conn = make_member("alice");
        registry.join("g", conn.clone()).await;
        assert_eq!(registry.group_count().await, 1);

        registry.leave("g", &conn.id).await;
        assert_eq!(registry.group_count().await, 0);
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let registry = GroupRegistry::new();
        let a = make_member("alice");
        let b = make_member("bob");
        registry.join("g1", a.clone()).await;
        registry.join("g2", b.clone()).await;

        assert_eq!(registry.members_of("g1").await.len(), 1);
        assert_eq!(registry.members_of("g2").await.len(), 1);

        registry.leave("g1", &a.id).await;
        assert!(registry.members_of("g1").await.is_empty());
        assert_eq!(registry.members_of("g2").await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_joins_are_all_recorded() {
        let registry = Arc::new(GroupRegistry::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            let conn = make_member(&format!("user{i}"));
            handles.push(tokio::spawn(async move {
                registry.join("g", conn).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.members_of("g").await.len(), 32);
        assert_eq!(registry.connection_count(), 32);
    }
}
