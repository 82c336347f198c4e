//! Live connection handles and the outbox table.
//!
//! Every open socket gets a [`ConnectionId`] and an unbounded outbox
//! channel. The sender half lives in [`Connections`]; it is the only handle
//! the rest of the system uses to reach a client, so a connection that goes
//! away simply becomes a closed channel.

use dashmap::DashMap;
use ripple_protocol::ServerEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

/// Counter folded into generated IDs so two connections opened within the
/// same nanosecond still differ.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sender half of a connection's outbox.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
/// Receiver half, owned by the connection's writer task.
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Outbox table mapping live connections to their event channels.
///
/// Shared by injection (`Arc`), never as ambient global state. Delivery to
/// one connection is isolated from every other: a closed outbox is pruned
/// and skipped, it never aborts a broadcast.
#[derive(Debug, Default)]
pub struct Connections {
    outboxes: DashMap<ConnectionId, EventSender>,
}

impl Connections {
    /// Create an empty outbox table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    /// Whether no connections are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    /// Whether a connection is attached.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.outboxes.contains_key(id)
    }

    /// Attach a connection, returning the receiver half of its outbox.
    ///
    /// Attaching an ID twice replaces the previous outbox; the old receiver
    /// sees its channel close.
    pub fn attach(&self, id: &ConnectionId) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(id.clone(), tx);
        debug!(connection = %id, "Connection attached");
        rx
    }

    /// Detach a connection, dropping its outbox sender.
    pub fn detach(&self, id: &ConnectionId) {
        if self.outboxes.remove(id).is_some() {
            debug!(connection = %id, "Connection detached");
        }
    }

    /// Deliver an event to a single connection.
    ///
    /// Returns `false` if the connection is unknown or its outbox is
    /// closed; a closed outbox is pruned from the table.
    pub fn send_to(&self, id: &ConnectionId, event: ServerEvent) -> bool {
        let stale = match self.outboxes.get(id) {
            Some(entry) => entry.send(event).is_err(),
            None => return false,
        };

        if stale {
            self.outboxes.remove(id);
            trace!(connection = %id, "Pruned closed outbox");
            return false;
        }
        true
    }

    /// Deliver an event to every attached connection.
    ///
    /// Returns the number of connections reached. Closed outboxes are
    /// pruned along the way.
    pub fn broadcast_all(&self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut stale: Vec<ConnectionId> = Vec::new();

        for entry in self.outboxes.iter() {
            if entry.value().send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                stale.push(entry.key().clone());
            }
        }

        for id in stale {
            self.outboxes.remove(&id);
            trace!(connection = %id, "Pruned closed outbox");
        }

        delivered
    }
}
