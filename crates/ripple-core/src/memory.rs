//! In-memory [`ChatStore`] implementation.
//!
//! The reference store: backs tests and single-node development runs.
//! Everything lives in concurrent maps; per-chat message order is the
//! append order, which matches creation-timestamp order because ids and
//! timestamps are assigned under the same append.

use crate::store::{ChatStore, NewMessage, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use ripple_protocol::{Chat, ChatMember, ChatType, MemberRole, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQ: AtomicU64 = AtomicU64::new(0);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

fn generate_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let counter = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{:x}_{:x}", prefix, timestamp, counter)
}

/// Concurrent in-memory chat store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chats: DashMap<String, Chat>,
    messages: DashMap<String, Message>,
    /// Chat → message ids in append order.
    chat_messages: DashMap<String, Vec<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted messages, across all chats.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn is_member(&self, chat_id: &str, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .chats
            .get(chat_id)
            .map(|chat| chat.has_member(user_id))
            .unwrap_or(false))
    }

    async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        if !self.chats.contains_key(&new.chat_id) {
            return Err(StoreError::NotFound(format!("chat {}", new.chat_id)));
        }

        let now = now_millis();
        let message = Message {
            id: generate_id("msg"),
            chat_id: new.chat_id.clone(),
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            media_url: new.media_url,
            reply_to_message_id: new.reply_to_message_id,
            is_read: false,
            created_at: now,
            updated_at: now,
        };

        self.chat_messages
            .entry(new.chat_id.clone())
            .or_default()
            .push(message.id.clone());
        if let Some(mut chat) = self.chats.get_mut(&new.chat_id) {
            chat.last_message_id = Some(message.id.clone());
        }
        self.messages.insert(message.id.clone(), message.clone());

        Ok(message)
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.get(message_id).map(|m| m.value().clone()))
    }

    async fn set_message_read(&self, message_id: &str) -> Result<(), StoreError> {
        let mut message = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        message.is_read = true;
        message.updated_at = now_millis();
        Ok(())
    }

    async fn touch_chat_activity(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut chat = self
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| StoreError::NotFound(format!("chat {chat_id}")))?;
        chat.updated_at = now_millis();
        Ok(())
    }

    async fn create_chat(
        &self,
        name: Option<String>,
        creator_id: &str,
        member_ids: Vec<String>,
    ) -> Result<Chat, StoreError> {
        let mut all_members: Vec<String> = member_ids;
        if !all_members.iter().any(|m| m == creator_id) {
            all_members.push(creator_id.to_string());
        }

        let kind = if all_members.len() > 2 {
            ChatType::Group
        } else {
            ChatType::Direct
        };

        let members = all_members
            .into_iter()
            .map(|user_id| {
                let role = if user_id == creator_id {
                    MemberRole::Admin
                } else {
                    MemberRole::Member
                };
                ChatMember { user_id, role }
            })
            .collect();

        let now = now_millis();
        let chat = Chat {
            id: generate_id("chat"),
            name,
            kind,
            members,
            last_message_id: None,
            created_at: now,
            updated_at: now,
        };

        self.chats.insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>, StoreError> {
        let mut chats: Vec<Chat> = self
            .chats
            .iter()
            .filter(|entry| entry.value().has_member(user_id))
            .map(|entry| entry.value().clone())
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn chat_by_id(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.chats.get(chat_id).map(|c| c.value().clone()))
    }

    async fn messages_for_chat(
        &self,
        chat_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let ids: Vec<String> = match self.chat_messages.get(chat_id) {
            Some(ids) => ids
                .iter()
                .rev()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
            None => return Ok(Vec::new()),
        };

        let mut page: Vec<Message> = ids
            .into_iter()
            .filter_map(|id| self.messages.get(&id).map(|m| m.value().clone()))
            .collect();
        page.reverse();
        Ok(page)
    }
}
