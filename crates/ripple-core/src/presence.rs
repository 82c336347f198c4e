//! Presence tracking and global status broadcast.
//!
//! Presence is implied by session membership: a user with a registered
//! connection is online. Transitions are announced to every connection,
//! not room-scoped. Nothing here is persisted; a restart resets presence
//! to all-offline.

use crate::connection::Connections;
use dashmap::DashSet;
use ripple_protocol::{ServerEvent, UserStatus};
use std::sync::Arc;
use tracing::debug;

/// Online-user set plus the broadcast seam.
#[derive(Debug)]
pub struct PresenceTracker {
    online: DashSet<String>,
    connections: Arc<Connections>,
}

impl PresenceTracker {
    /// Create a tracker that announces transitions through `connections`.
    #[must_use]
    pub fn new(connections: Arc<Connections>) -> Self {
        Self {
            online: DashSet::new(),
            connections,
        }
    }

    /// Number of users currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Whether a user is online.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    /// Snapshot of online user IDs.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.online.iter().map(|u| u.clone()).collect()
    }

    /// Record a user as online and announce it to every connection.
    ///
    /// The announcement is unconditional: a repeated `join` re-broadcasts
    /// ONLINE, which clients treat as a refresh.
    pub fn mark_online(&self, user_id: &str) -> bool {
        let is_new = self.online.insert(user_id.to_string());
        if is_new {
            debug!(user = %user_id, "Presence: online");
        }
        self.connections
            .broadcast_all(&ServerEvent::user_status(user_id, UserStatus::Online));
        is_new
    }

    /// Record a user as offline and announce it to every connection.
    pub fn mark_offline(&self, user_id: &str) -> bool {
        let was_online = self.online.remove(user_id).is_some();
        if was_online {
            debug!(user = %user_id, "Presence: offline");
        }
        self.connections
            .broadcast_all(&ServerEvent::user_status(user_id, UserStatus::Offline));
        was_online
    }
}
