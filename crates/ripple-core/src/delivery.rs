//! Message delivery pipeline: persist first, then fan out.
//!
//! The pipeline is the only path from a send request to a room broadcast,
//! whether the request came over a socket event or the REST boundary. The
//! broadcast is scheduled strictly after the store call completes, so a
//! message is never observed by room subscribers before it is durably
//! recorded, and broadcast order within a chat follows persistence
//! completion order.

use crate::connection::{ConnectionId, Connections};
use crate::room::RoomIndex;
use crate::store::{ChatStore, NewMessage, StoreError};
use ripple_protocol::{Message, SendMessageBody, ServerEvent, MAX_CONTENT_LENGTH};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Delivery pipeline errors, mirrored back to clients as `error` events.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The acting user is not a member of the chat.
    #[error("You are not a member of this chat")]
    PermissionDenied,

    /// The request itself is malformed.
    #[error("Invalid message: {0}")]
    InvalidInput(&'static str),

    /// The referenced chat or message does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store did not answer within the configured deadline.
    #[error("Store operation timed out")]
    StoreTimeout,
}

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Deadline for every store call; a hung store surfaces as a failure
    /// instead of stalling the connection's handler forever.
    pub store_timeout: Duration,
    /// Maximum message content length in characters.
    pub max_content_length: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            max_content_length: MAX_CONTENT_LENGTH,
        }
    }
}

/// Persist-then-broadcast pipeline over a [`ChatStore`].
pub struct DeliveryPipeline<S> {
    store: Arc<S>,
    rooms: Arc<RoomIndex>,
    connections: Arc<Connections>,
    config: DeliveryConfig,
}

impl<S: ChatStore> DeliveryPipeline<S> {
    /// Create a pipeline over the given store and broadcast seams.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        rooms: Arc<RoomIndex>,
        connections: Arc<Connections>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            rooms,
            connections,
            config,
        }
    }

    async fn store_call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, DeliveryError> {
        match timeout(self.config.store_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DeliveryError::StoreTimeout),
        }
    }

    /// Persist a message and fan it out to the chat's room.
    ///
    /// Validation and persistence happen before any broadcast; a failure
    /// anywhere leaves other room participants having observed nothing.
    /// The sender's own connection is expected to be subscribed to the
    /// room and receives its own echo.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` if the sender is not a chat member,
    /// `InvalidInput` for malformed content, missing media URL, or a bad
    /// reply reference, store errors and timeouts otherwise.
    pub async fn send(
        &self,
        chat_id: &str,
        sender_id: &str,
        body: SendMessageBody,
    ) -> Result<Message, DeliveryError> {
        if body.content.trim().is_empty() {
            return Err(DeliveryError::InvalidInput("content must not be empty"));
        }
        if body.content.chars().count() > self.config.max_content_length {
            return Err(DeliveryError::InvalidInput("content too long"));
        }

        if !self
            .store_call(self.store.is_member(chat_id, sender_id))
            .await?
        {
            return Err(DeliveryError::PermissionDenied);
        }

        if body.kind.is_media() && body.media_url.is_none() {
            return Err(DeliveryError::InvalidInput(
                "media messages require a media URL",
            ));
        }

        if let Some(reply_id) = body.reply_to_message_id.as_deref() {
            match self.store_call(self.store.find_message(reply_id)).await? {
                Some(target) if target.chat_id == chat_id => {}
                Some(_) => {
                    return Err(DeliveryError::InvalidInput(
                        "reply target belongs to a different chat",
                    ))
                }
                None => return Err(DeliveryError::InvalidInput("reply target not found")),
            }
        }

        let message = self
            .store_call(self.store.create_message(NewMessage {
                chat_id: chat_id.to_string(),
                sender_id: sender_id.to_string(),
                content: body.content,
                kind: body.kind,
                media_url: body.media_url,
                reply_to_message_id: body.reply_to_message_id,
            }))
            .await?;

        // Advisory marker: the message is durable at this point, so a
        // failed bump is logged and swallowed rather than surfaced.
        if let Err(e) = self
            .store_call(self.store.touch_chat_activity(chat_id))
            .await
        {
            warn!(chat = %chat_id, error = %e, "Failed to bump chat activity");
        }

        let recipients = self.rooms.broadcast(
            &self.connections,
            chat_id,
            &ServerEvent::new_message(chat_id, message.clone()),
            None,
        );
        self.rooms.broadcast(
            &self.connections,
            chat_id,
            &ServerEvent::typing_stop(chat_id, sender_id),
            None,
        );

        debug!(
            chat = %chat_id,
            message = %message.id,
            recipients,
            "Message delivered"
        );

        Ok(message)
    }

    /// Flip a message's read receipt.
    ///
    /// A sender "reading" their own message and a repeat read are both
    /// no-ops, not errors. The room-scoped `messageRead` broadcast fires
    /// only on the unread→read transition.
    ///
    /// # Errors
    ///
    /// `NotFound` if the message does not exist, `PermissionDenied` if the
    /// reader is not a member of the owning chat.
    pub async fn mark_read(&self, message_id: &str, reader_id: &str) -> Result<(), DeliveryError> {
        let message = self
            .store_call(self.store.find_message(message_id))
            .await?
            .ok_or_else(|| DeliveryError::NotFound(format!("message {message_id}")))?;

        if !self
            .store_call(self.store.is_member(&message.chat_id, reader_id))
            .await?
        {
            return Err(DeliveryError::PermissionDenied);
        }

        if message.sender_id == reader_id || message.is_read {
            return Ok(());
        }

        self.store_call(self.store.set_message_read(message_id))
            .await?;

        self.rooms.broadcast(
            &self.connections,
            &message.chat_id,
            &ServerEvent::message_read(message_id, reader_id),
            None,
        );

        Ok(())
    }

    /// Relay a composing indicator to the room, suppressing the echo to
    /// the originating connection. Fire-and-forget.
    pub fn typing(&self, chat_id: &str, user_id: &str, origin: &ConnectionId) {
        self.rooms.broadcast(
            &self.connections,
            chat_id,
            &ServerEvent::typing(chat_id, user_id),
            Some(origin),
        );
    }

    /// Relay a composing-stopped indicator, suppressing the sender echo.
    pub fn stop_typing(&self, chat_id: &str, user_id: &str, origin: &ConnectionId) {
        self.rooms.broadcast(
            &self.connections,
            chat_id,
            &ServerEvent::typing_stop(chat_id, user_id),
            Some(origin),
        );
    }
}
