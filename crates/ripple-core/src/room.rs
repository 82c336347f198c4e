//! Room membership index: which connections subscribe to which chat.
//!
//! Rooms hold connection IDs, never user IDs, and are independent of the
//! chat membership stored persistently — any connection may subscribe to
//! any room ID (see DESIGN.md for the authorization decision). A reverse
//! index tracks each connection's rooms so disconnect can eagerly clean up.

use crate::connection::{ConnectionId, Connections};
use dashmap::{DashMap, DashSet};
use ripple_protocol::ServerEvent;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default cap on rooms per connection.
const DEFAULT_MAX_ROOMS_PER_CONNECTION: usize = 100;

/// Room index errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The connection is already at its room cap.
    #[error("Maximum room subscriptions reached")]
    MaxSubscriptionsReached,
}

/// Broadcast-group index keyed by chat ID.
#[derive(Debug)]
pub struct RoomIndex {
    /// Room → subscribed connections.
    rooms: DashMap<String, DashSet<ConnectionId>>,
    /// Connection → subscribed rooms, for eager disconnect cleanup.
    memberships: DashMap<ConnectionId, DashSet<String>>,
    max_rooms_per_connection: usize,
}

impl Default for RoomIndex {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_ROOMS_PER_CONNECTION)
    }
}

impl RoomIndex {
    /// Create an index with the default per-connection cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index with a custom per-connection room cap.
    #[must_use]
    pub fn with_limit(max_rooms_per_connection: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            max_rooms_per_connection,
        }
    }

    /// Number of rooms with at least one subscriber.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Subscriber count for a room.
    #[must_use]
    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Whether a connection subscribes to a room.
    #[must_use]
    pub fn contains(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .map(|r| r.contains(connection_id))
            .unwrap_or(false)
    }

    /// Rooms a connection currently subscribes to.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().map(|r| r.clone()).collect())
            .unwrap_or_default()
    }

    /// Subscribe a connection to a room. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is at its room cap.
    pub fn join(&self, room_id: &str, connection_id: &ConnectionId) -> Result<(), RoomError> {
        let conn_rooms = self.memberships.entry(connection_id.clone()).or_default();

        if conn_rooms.contains(room_id) {
            return Ok(());
        }
        if conn_rooms.len() >= self.max_rooms_per_connection {
            return Err(RoomError::MaxSubscriptionsReached);
        }

        conn_rooms.insert(room_id.to_string());
        drop(conn_rooms);

        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.clone());

        debug!(room = %room_id, connection = %connection_id, "Joined room");
        Ok(())
    }

    /// Unsubscribe a connection from a room. No-op if absent.
    pub fn leave(&self, room_id: &str, connection_id: &ConnectionId) {
        if let Some(conn_rooms) = self.memberships.get(connection_id) {
            conn_rooms.remove(room_id);
        }
        self.remove_subscriber(room_id, connection_id);
    }

    /// Unsubscribe a connection from every room it joined.
    ///
    /// Called on disconnect (eager cleanup). Returns the number of rooms
    /// left.
    pub fn leave_all(&self, connection_id: &ConnectionId) -> usize {
        let Some((_, rooms)) = self.memberships.remove(connection_id) else {
            return 0;
        };

        let mut left = 0;
        for room_id in rooms.iter() {
            self.remove_subscriber(&room_id, connection_id);
            left += 1;
        }

        debug!(connection = %connection_id, rooms = left, "Left all rooms");
        left
    }

    fn remove_subscriber(&self, room_id: &str, connection_id: &ConnectionId) {
        let emptied = match self.rooms.get_mut(room_id) {
            Some(subscribers) => {
                subscribers.remove(connection_id);
                subscribers.is_empty()
            }
            None => return,
        };

        if emptied {
            self.rooms
                .remove_if(room_id, |_, subscribers| subscribers.is_empty());
            trace!(room = %room_id, "Dropped empty room");
        }
    }

    /// Deliver an event to every subscriber of a room, except the
    /// optionally excluded connection (echo suppression for signaling).
    ///
    /// The subscriber set is snapshotted before delivery, so concurrent
    /// join/leave cannot invalidate the iteration. Per-recipient failures
    /// are isolated: a stale connection is dropped from the room and the
    /// loop continues. Returns the number of connections reached.
    pub fn broadcast(
        &self,
        connections: &Connections,
        room_id: &str,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let subscribers: Vec<ConnectionId> = match self.rooms.get(room_id) {
            Some(room) => room.iter().map(|c| c.clone()).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for subscriber in &subscribers {
            if Some(subscriber) == exclude {
                continue;
            }
            if connections.send_to(subscriber, event.clone()) {
                delivered += 1;
            } else {
                // Stale subscriber: outbox gone. Lazily prune it here on
                // top of the eager disconnect cleanup.
                warn!(room = %room_id, connection = %subscriber, "Dropping stale subscriber");
                self.leave(room_id, subscriber);
            }
        }

        trace!(room = %room_id, recipients = delivered, "Broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_protocol::UserStatus;

    fn event() -> ServerEvent {
        ServerEvent::typing("chat1", "alice")
    }

    #[test]
    fn test_join_is_idempotent() {
        let rooms = RoomIndex::new();
        let c1 = ConnectionId::new("c1");

        rooms.join("chat1", &c1).unwrap();
        rooms.join("chat1", &c1).unwrap();

        assert_eq!(rooms.subscriber_count("chat1"), 1);
        assert_eq!(rooms.rooms_of(&c1), vec!["chat1".to_string()]);
    }

    #[test]
    fn test_leave_drops_empty_room() {
        let rooms = RoomIndex::new();
        let c1 = ConnectionId::new("c1");

        rooms.join("chat1", &c1).unwrap();
        assert_eq!(rooms.room_count(), 1);

        rooms.leave("chat1", &c1);
        assert_eq!(rooms.room_count(), 0);

        // Leaving again is a no-op.
        rooms.leave("chat1", &c1);
    }

    #[test]
    fn test_subscription_cap() {
        let rooms = RoomIndex::with_limit(2);
        let c1 = ConnectionId::new("c1");

        rooms.join("a", &c1).unwrap();
        rooms.join("b", &c1).unwrap();
        assert!(matches!(
            rooms.join("c", &c1),
            Err(RoomError::MaxSubscriptionsReached)
        ));

        // Re-joining an existing room does not hit the cap.
        rooms.join("a", &c1).unwrap();
    }

    #[test]
    fn test_leave_all() {
        let rooms = RoomIndex::new();
        let c1 = ConnectionId::new("c1");
        let c2 = ConnectionId::new("c2");

        rooms.join("a", &c1).unwrap();
        rooms.join("b", &c1).unwrap();
        rooms.join("a", &c2).unwrap();

        assert_eq!(rooms.leave_all(&c1), 2);
        assert_eq!(rooms.subscriber_count("a"), 1);
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.rooms_of(&c1).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let connections = Connections::new();
        let rooms = RoomIndex::new();
        let c1 = ConnectionId::new("c1");
        let c2 = ConnectionId::new("c2");

        let mut rx1 = connections.attach(&c1);
        let mut rx2 = connections.attach(&c2);
        rooms.join("chat1", &c1).unwrap();
        rooms.join("chat1", &c2).unwrap();

        let delivered = rooms.broadcast(&connections, "chat1", &event(), Some(&c1));
        assert_eq!(delivered, 1);

        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room() {
        let connections = Connections::new();
        let rooms = RoomIndex::new();

        assert_eq!(rooms.broadcast(&connections, "nowhere", &event(), None), 0);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_stale_subscriber() {
        let connections = Connections::new();
        let rooms = RoomIndex::new();
        let alive = ConnectionId::new("alive");
        let dead = ConnectionId::new("dead");

        let mut rx = connections.attach(&alive);
        rooms.join("chat1", &alive).unwrap();
        // Subscribed but never attached: simulates a connection that went
        // away without cleanup.
        rooms.join("chat1", &dead).unwrap();

        let status = ServerEvent::user_status("alice", UserStatus::Online);
        let delivered = rooms.broadcast(&connections, "chat1", &status, None);
        assert_eq!(delivered, 1);
        assert!(rx.recv().await.is_some());
        assert_eq!(rooms.subscriber_count("chat1"), 1);
    }
}
