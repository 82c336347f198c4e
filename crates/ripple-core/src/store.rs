//! The persistent store boundary.
//!
//! The realtime core never talks to a database directly; everything it
//! needs from durable storage goes through [`ChatStore`]. The trait is
//! object-safe so the server can swap implementations (in-memory for tests
//! and development, a database-backed store in production) without touching
//! the delivery pipeline.

use async_trait::async_trait;
use ripple_protocol::{Chat, Message, MessageType};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store is unreachable or failed internally.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Input for appending a message. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageType,
    pub media_url: Option<String>,
    pub reply_to_message_id: Option<String>,
}

/// Operations the realtime core requires from durable storage.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Whether `user_id` is a member of `chat_id`. A missing chat reads as
    /// not-a-member.
    async fn is_member(&self, chat_id: &str, user_id: &str) -> Result<bool, StoreError>;

    /// Append a message. Returns the persisted record with generated id
    /// and creation timestamp; ordering within a chat follows these
    /// timestamps.
    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError>;

    /// Load a message by ID.
    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, StoreError>;

    /// Set a message's read flag.
    async fn set_message_read(&self, message_id: &str) -> Result<(), StoreError>;

    /// Bump a chat's last-activity marker.
    async fn touch_chat_activity(&self, chat_id: &str) -> Result<(), StoreError>;

    /// Create a chat. The creator is always included in the member list
    /// and holds the admin role; more than two members makes it a group.
    async fn create_chat(
        &self,
        name: Option<String>,
        creator_id: &str,
        member_ids: Vec<String>,
    ) -> Result<Chat, StoreError>;

    /// Chats the user belongs to, most recently active first.
    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>, StoreError>;

    /// Load a chat by ID.
    async fn chat_by_id(&self, chat_id: &str) -> Result<Option<Chat>, StoreError>;

    /// Page through a chat's messages, chronological within the page,
    /// `offset` counted back from the newest message.
    async fn messages_for_chat(
        &self,
        chat_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError>;
}
