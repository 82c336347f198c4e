//! Session registry: which user owns which live connection.
//!
//! At most one live connection per user. A second `join` by the same user
//! overwrites the first binding (last join wins), so the stale connection's
//! eventual disconnect finds no entry and triggers no offline broadcast.

use crate::connection::ConnectionId;
use dashmap::DashMap;
use tracing::debug;

/// User → connection bindings.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: DashMap<String, ConnectionId>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no users are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind a user to a connection, replacing any prior binding.
    ///
    /// Returns the connection the user was previously bound to, if any.
    pub fn register(
        &self,
        user_id: impl Into<String>,
        connection_id: ConnectionId,
    ) -> Option<ConnectionId> {
        let user_id = user_id.into();
        let prior = self.entries.insert(user_id.clone(), connection_id);
        debug!(user = %user_id, replaced = prior.is_some(), "Session registered");
        prior
    }

    /// Remove whichever binding currently maps to this connection.
    ///
    /// Linear scan over entries; the registry holds one entry per online
    /// user, so this stays cheap at the intended scale. Returns the user
    /// that was bound, if any — the trigger for the offline broadcast.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<String> {
        let user_id = self
            .entries
            .iter()
            .find(|entry| entry.value() == connection_id)
            .map(|entry| entry.key().clone())?;

        // Remove only if the binding still points at this connection, in
        // case the user re-joined on another connection mid-scan.
        self.entries
            .remove_if(&user_id, |_, bound| bound == connection_id)?;

        debug!(user = %user_id, connection = %connection_id, "Session unregistered");
        Some(user_id)
    }

    /// Remove a user's binding by user ID.
    pub fn remove_user(&self, user_id: &str) -> Option<ConnectionId> {
        self.entries.remove(user_id).map(|(_, conn)| conn)
    }

    /// Resolve a user to their live connection, for user-targeted events.
    #[must_use]
    pub fn resolve(&self, user_id: &str) -> Option<ConnectionId> {
        self.entries.get(user_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_join_wins() {
        let registry = SessionRegistry::new();
        let c1 = ConnectionId::new("c1");
        let c2 = ConnectionId::new("c2");

        assert!(registry.register("u1", c1.clone()).is_none());
        assert_eq!(registry.register("u1", c2.clone()), Some(c1));
        assert_eq!(registry.resolve("u1"), Some(c2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_by_connection() {
        let registry = SessionRegistry::new();
        registry.register("u1", ConnectionId::new("c1"));
        registry.register("u2", ConnectionId::new("c2"));

        assert_eq!(
            registry.unregister(&ConnectionId::new("c1")),
            Some("u1".to_string())
        );
        assert!(registry.resolve("u1").is_none());
        assert!(registry.resolve("u2").is_some());

        // Unknown connection is a no-op.
        assert!(registry.unregister(&ConnectionId::new("gone")).is_none());
    }

    #[test]
    fn test_stale_connection_unregister_is_noop() {
        let registry = SessionRegistry::new();
        let old = ConnectionId::new("old");
        registry.register("u1", old.clone());
        registry.register("u1", ConnectionId::new("new"));

        // The overwritten connection no longer owns the binding.
        assert!(registry.unregister(&old).is_none());
        assert_eq!(registry.resolve("u1"), Some(ConnectionId::new("new")));
    }
}
