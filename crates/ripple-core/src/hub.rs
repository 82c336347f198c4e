//! Connection lifecycle controller.
//!
//! The hub glues the registry, room index, presence tracker, and delivery
//! pipeline together behind two entry points a transport layer drives:
//! `connect`/`disconnect` for the socket lifecycle and `handle_event` for
//! everything a client sends in between. Per connection, events are
//! handled in arrival order; across connections, handlers run freely in
//! parallel over the shared (dashmap-backed) structures.
//!
//! Connection states: transport-open (unbound), user-bound after `join`,
//! subscribed to any number of rooms after `joinChat`, gone after
//! disconnect. Only `sendMessage` and `markAsRead` report failures back,
//! and only to the originating connection; everything else is
//! fire-and-forget.

use crate::connection::{ConnectionId, Connections, EventReceiver};
use crate::delivery::{DeliveryConfig, DeliveryPipeline};
use crate::presence::PresenceTracker;
use crate::room::RoomIndex;
use crate::session::SessionRegistry;
use crate::store::ChatStore;
use ripple_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Delivery pipeline tuning.
    pub delivery: DeliveryConfig,
    /// Cap on rooms per connection (`None` = default cap).
    pub max_rooms_per_connection: Option<usize>,
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Attached connections.
    pub connections: usize,
    /// Rooms with at least one subscriber.
    pub rooms: usize,
    /// Users currently online.
    pub online_users: usize,
}

/// The realtime core, one instance per process.
pub struct Hub<S> {
    store: Arc<S>,
    connections: Arc<Connections>,
    sessions: SessionRegistry,
    rooms: Arc<RoomIndex>,
    presence: PresenceTracker,
    pipeline: DeliveryPipeline<S>,
}

impl<S: ChatStore> Hub<S> {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(store: Arc<S>, config: HubConfig) -> Self {
        info!("Creating hub with config: {:?}", config);

        let connections = Arc::new(Connections::new());
        let rooms = Arc::new(match config.max_rooms_per_connection {
            Some(limit) => RoomIndex::with_limit(limit),
            None => RoomIndex::new(),
        });
        let presence = PresenceTracker::new(connections.clone());
        let pipeline = DeliveryPipeline::new(
            store.clone(),
            rooms.clone(),
            connections.clone(),
            config.delivery,
        );

        Self {
            store,
            connections,
            sessions: SessionRegistry::new(),
            rooms,
            presence,
            pipeline,
        }
    }

    /// The store this hub persists through.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The delivery pipeline, shared with the REST boundary.
    #[must_use]
    pub fn pipeline(&self) -> &DeliveryPipeline<S> {
        &self.pipeline
    }

    /// The session registry.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The room membership index.
    #[must_use]
    pub fn rooms(&self) -> &RoomIndex {
        &self.rooms
    }

    /// The presence tracker.
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            rooms: self.rooms.room_count(),
            online_users: self.presence.online_count(),
        }
    }

    /// Open a connection: allocate an ID and an outbox.
    ///
    /// The caller owns the receiver; dropping it is equivalent to the
    /// socket going away, though `disconnect` must still run for cleanup.
    pub fn connect(&self) -> (ConnectionId, EventReceiver) {
        let connection_id = ConnectionId::generate();
        let receiver = self.connections.attach(&connection_id);
        debug!(connection = %connection_id, "Connected");
        (connection_id, receiver)
    }

    /// Tear down a connection: leave every room (eager cleanup), drop any
    /// user binding (which triggers the offline broadcast), drop the
    /// outbox.
    pub fn disconnect(&self, connection_id: &ConnectionId) {
        let rooms_left = self.rooms.leave_all(connection_id);

        if let Some(user_id) = self.sessions.unregister(connection_id) {
            self.presence.mark_offline(&user_id);
        }

        self.connections.detach(connection_id);
        debug!(connection = %connection_id, rooms_left, "Disconnected");
    }

    /// Route an event to a user's live connection, if they have one.
    ///
    /// Returns `true` if the user was bound and the event was delivered.
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.sessions.resolve(user_id) {
            Some(connection_id) => self.connections.send_to(&connection_id, event),
            None => false,
        }
    }

    /// Broadcast an event to every subscriber of a chat's room.
    ///
    /// Returns the number of connections reached.
    pub fn send_to_chat(&self, chat_id: &str, event: ServerEvent) -> usize {
        self.rooms.broadcast(&self.connections, chat_id, &event, None)
    }

    /// Dispatch one client event for a connection.
    pub async fn handle_event(&self, connection_id: &ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { user_id } => {
                self.sessions.register(user_id.as_str(), connection_id.clone());
                self.presence.mark_online(&user_id);
            }

            ClientEvent::Leave { user_id } => {
                self.sessions.remove_user(&user_id);
                self.presence.mark_offline(&user_id);
            }

            ClientEvent::JoinChat { chat_id } => {
                // No membership check here: any connection may subscribe
                // to any room ID. See DESIGN.md.
                if let Err(e) = self.rooms.join(&chat_id, connection_id) {
                    warn!(connection = %connection_id, chat = %chat_id, error = %e, "Room join rejected");
                }
            }

            ClientEvent::LeaveChat { chat_id } => {
                self.rooms.leave(&chat_id, connection_id);
            }

            ClientEvent::SendMessage {
                chat_id,
                user_id,
                message,
            } => {
                if let Err(e) = self.pipeline.send(&chat_id, &user_id, message).await {
                    warn!(connection = %connection_id, chat = %chat_id, error = %e, "Send failed");
                    self.connections.send_to(
                        connection_id,
                        ServerEvent::error("Failed to send message", e.to_string()),
                    );
                }
            }

            ClientEvent::Typing { chat_id, user_id } => {
                self.pipeline.typing(&chat_id, &user_id, connection_id);
            }

            ClientEvent::StopTyping { chat_id, user_id } => {
                self.pipeline.stop_typing(&chat_id, &user_id, connection_id);
            }

            ClientEvent::MarkAsRead {
                message_id,
                user_id,
            } => {
                if let Err(e) = self.pipeline.mark_read(&message_id, &user_id).await {
                    warn!(connection = %connection_id, message = %message_id, error = %e, "Mark-as-read failed");
                    self.connections.send_to(
                        connection_id,
                        ServerEvent::error("Failed to mark message as read", e.to_string()),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use ripple_protocol::{Chat, MessageType, SendMessageBody, UserStatus};

    fn hub() -> Hub<MemoryStore> {
        Hub::new(Arc::new(MemoryStore::new()))
    }

    async fn chat(hub: &Hub<MemoryStore>, members: &[&str]) -> Chat {
        hub.store()
            .create_chat(
                None,
                members[0],
                members.iter().map(|m| m.to_string()).collect(),
            )
            .await
            .unwrap()
    }

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn new_messages(events: &[ServerEvent]) -> Vec<&ServerEvent> {
        events
            .iter()
            .filter(|e| matches!(e, ServerEvent::NewMessage { .. }))
            .collect()
    }

    #[tokio::test]
    async fn test_last_join_wins() {
        let hub = hub();
        let (c1, _rx1) = hub.connect();
        let (c2, _rx2) = hub.connect();

        hub.handle_event(&c1, ClientEvent::Join { user_id: "u1".into() }).await;
        hub.handle_event(&c2, ClientEvent::Join { user_id: "u1".into() }).await;

        assert_eq!(hub.sessions().resolve("u1"), Some(c2));
    }

    #[tokio::test]
    async fn test_message_scenario_both_subscribers_receive() {
        let hub = hub();
        let chat = chat(&hub, &["A", "B"]).await;

        let (ca, mut rx_a) = hub.connect();
        let (cb, mut rx_b) = hub.connect();
        hub.handle_event(&ca, ClientEvent::Join { user_id: "A".into() }).await;
        hub.handle_event(&cb, ClientEvent::Join { user_id: "B".into() }).await;
        hub.handle_event(&ca, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;
        hub.handle_event(&cb, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        hub.handle_event(
            &ca,
            ClientEvent::SendMessage {
                chat_id: chat.id.clone(),
                user_id: "A".into(),
                message: SendMessageBody::text("hi"),
            },
        )
        .await;

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            let messages = new_messages(&events);
            assert_eq!(messages.len(), 1);
            match messages[0] {
                ServerEvent::NewMessage { chat_id, message } => {
                    assert_eq!(chat_id, &chat.id);
                    assert_eq!(message.content, "hi");
                    assert_eq!(message.sender_id, "A");
                }
                _ => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn test_send_failure_reported_to_origin_only() {
        let hub = hub();
        let chat = chat(&hub, &["A", "B"]).await;

        let (ca, mut rx_a) = hub.connect();
        let (cb, mut rx_b) = hub.connect();
        hub.handle_event(&ca, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;
        hub.handle_event(&cb, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;

        // Image without a media URL.
        hub.handle_event(
            &ca,
            ClientEvent::SendMessage {
                chat_id: chat.id.clone(),
                user_id: "A".into(),
                message: SendMessageBody {
                    content: "pic".into(),
                    kind: MessageType::Image,
                    media_url: None,
                    reply_to_message_id: None,
                },
            },
        )
        .await;

        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::Error { message, .. } => {
                assert_eq!(message, "Failed to send message");
            }
            other => panic!("Unexpected event: {other:?}"),
        }
        assert!(drain(&mut rx_b).is_empty());

        // Non-member sender takes the same error path.
        hub.handle_event(
            &ca,
            ClientEvent::SendMessage {
                chat_id: chat.id.clone(),
                user_id: "mallory".into(),
                message: SendMessageBody::text("hi"),
            },
        )
        .await;
        assert!(matches!(drain(&mut rx_a)[0], ServerEvent::Error { .. }));
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_typing_excluded_from_sender() {
        let hub = hub();
        let chat = chat(&hub, &["A", "B"]).await;

        let (ca, mut rx_a) = hub.connect();
        let (cb, mut rx_b) = hub.connect();
        hub.handle_event(&ca, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;
        hub.handle_event(&cb, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;

        hub.handle_event(
            &ca,
            ClientEvent::Typing {
                chat_id: chat.id.clone(),
                user_id: "A".into(),
            },
        )
        .await;

        assert!(drain(&mut rx_a).is_empty());
        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::Typing { user_id, .. } if user_id == "A"));
    }

    #[tokio::test]
    async fn test_mark_as_read_flow() {
        let hub = hub();
        let chat = chat(&hub, &["A", "B"]).await;

        let message = hub
            .pipeline()
            .send(&chat.id, "A", SendMessageBody::text("hi"))
            .await
            .unwrap();

        let (cb, mut rx_b) = hub.connect();

        // The sender cannot receipt their own message.
        hub.handle_event(
            &cb,
            ClientEvent::MarkAsRead {
                message_id: message.id.clone(),
                user_id: "A".into(),
            },
        )
        .await;
        let stored = hub.store().find_message(&message.id).await.unwrap().unwrap();
        assert!(!stored.is_read);

        // A non-sender reader flips the flag; twice is fine.
        for _ in 0..2 {
            hub.handle_event(
                &cb,
                ClientEvent::MarkAsRead {
                    message_id: message.id.clone(),
                    user_id: "B".into(),
                },
            )
            .await;
        }
        let stored = hub.store().find_message(&message.id).await.unwrap().unwrap();
        assert!(stored.is_read);
        assert!(drain(&mut rx_b).is_empty());

        // Unknown message surfaces as an error event to the origin.
        hub.handle_event(
            &cb,
            ClientEvent::MarkAsRead {
                message_id: "missing".into(),
                user_id: "B".into(),
            },
        )
        .await;
        let events = drain(&mut rx_b);
        assert!(matches!(
            &events[0],
            ServerEvent::Error { message, .. } if message == "Failed to mark message as read"
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cleans_rooms_and_presence() {
        let hub = hub();
        let chat = chat(&hub, &["A", "B"]).await;

        let (ca, _rx_a) = hub.connect();
        let (cb, mut rx_b) = hub.connect();
        hub.handle_event(&ca, ClientEvent::Join { user_id: "A".into() }).await;
        hub.handle_event(&ca, ClientEvent::JoinChat { chat_id: chat.id.clone() }).await;
        drain(&mut rx_b);

        hub.disconnect(&ca);

        assert!(hub.rooms().rooms_of(&ca).is_empty());
        assert_eq!(hub.rooms().subscriber_count(&chat.id), 0);
        assert!(hub.sessions().resolve("A").is_none());
        assert!(!hub.presence().is_online("A"));

        let events = drain(&mut rx_b);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::UserStatus { user_id, status: UserStatus::Offline } if user_id == "A"
        )));

        // Broadcasting into the now-empty room reaches nobody and is fine.
        let sent = hub
            .pipeline()
            .send(&chat.id, "B", SendMessageBody::text("anyone?"))
            .await;
        assert!(sent.is_ok());
    }

    #[tokio::test]
    async fn test_leave_event_unbinds_and_goes_offline() {
        let hub = hub();
        let (ca, mut rx_a) = hub.connect();

        hub.handle_event(&ca, ClientEvent::Join { user_id: "A".into() }).await;
        assert!(hub.presence().is_online("A"));
        drain(&mut rx_a);

        hub.handle_event(&ca, ClientEvent::Leave { user_id: "A".into() }).await;
        assert!(hub.sessions().resolve("A").is_none());
        assert!(!hub.presence().is_online("A"));

        let events = drain(&mut rx_a);
        assert!(matches!(
            &events[0],
            ServerEvent::UserStatus { status: UserStatus::Offline, .. }
        ));
    }

    #[tokio::test]
    async fn test_send_to_user_routes_via_session() {
        let hub = hub();
        let (ca, mut rx_a) = hub.connect();
        hub.handle_event(&ca, ClientEvent::Join { user_id: "A".into() }).await;
        drain(&mut rx_a);

        assert!(hub.send_to_user("A", ServerEvent::message_read("m1", "B")));
        assert!(matches!(
            drain(&mut rx_a)[0],
            ServerEvent::MessageRead { .. }
        ));

        assert!(!hub.send_to_user("nobody", ServerEvent::message_read("m1", "B")));
    }

    #[tokio::test]
    async fn test_send_to_chat_after_last_subscriber_left() {
        let hub = hub();
        let (ca, _rx_a) = hub.connect();
        hub.handle_event(&ca, ClientEvent::JoinChat { chat_id: "r1".into() }).await;

        hub.disconnect(&ca);

        // The room is gone; broadcasting reaches nobody and does not error.
        let reached = hub.send_to_chat("r1", ServerEvent::typing("r1", "A"));
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let hub = hub();
        let (ca, _rx_a) = hub.connect();
        let (_cb, _rx_b) = hub.connect();

        hub.handle_event(&ca, ClientEvent::Join { user_id: "A".into() }).await;
        hub.handle_event(&ca, ClientEvent::JoinChat { chat_id: "room".into() }).await;

        let stats = hub.stats();
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.rooms, 1);
        assert_eq!(stats.online_users, 1);
    }
}
