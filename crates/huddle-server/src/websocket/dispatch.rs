//! Event fan-out to connected group members.

use std::sync::Arc;

use huddle_core::BroadcastEvent;
use metrics::counter;
use tracing::{debug, warn};

use super::registry::GroupRegistry;
use crate::metrics::{CHAT_BROADCASTS_TOTAL, CHAT_BROADCAST_DROPS_TOTAL};

/// Delivers broadcast events to every member of a group.
///
/// Fire-and-forget per member: a member whose transport is already gone
/// (closed or backed-up channel) is skipped with a diagnostic and never
/// fails the publish as a whole. Fan-out for one `publish` call happens in
/// call order; nothing is serialized across groups.
pub struct Dispatcher {
    registry: Arc<GroupRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry.
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self { registry }
    }

    /// Publish `event` to every connection currently registered under
    /// `group`. Returns the number of members the event was enqueued for.
    ///
    /// The event is serialized once and shared; membership is snapshotted
    /// under the registry lock and delivery happens outside it, so a slow
    /// receiver cannot block joins and leaves.
    pub async fn publish(&self, group: &str, event: &BroadcastEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(%error, "failed to serialize broadcast event");
                return 0;
            }
        };

        let members = self.registry.members_of(group).await;
        counter!(CHAT_BROADCASTS_TOTAL).increment(1);

        let mut delivered = 0usize;
        for member in &members {
            if member.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                counter!(CHAT_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %member.id,
                    group,
                    total_drops = member.drop_count(),
                    "failed to enqueue event for member (channel full or closed)"
                );
            }
        }

        debug!(group, recipients = members.len(), delivered, "broadcast event");
        delivered
    }
}
