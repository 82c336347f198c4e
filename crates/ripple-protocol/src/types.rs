//! Domain types shared across the wire boundary.
//!
//! These are the records the store hands back and the server pushes to
//! clients. Field names serialize in camelCase to match the event contract.

use serde::{Deserialize, Serialize};

/// Maximum message content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 5000;

/// The kind of payload a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

impl MessageType {
    /// Whether this kind requires an attached media URL.
    #[must_use]
    pub fn is_media(self) -> bool {
        !matches!(self, MessageType::Text)
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned identifier.
    pub id: String,
    /// Owning chat.
    pub chat_id: String,
    /// Author.
    pub sender_id: String,
    /// Text content (may be a caption for media messages).
    pub content: String,
    /// Payload kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Media location, required for non-text kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Message this one replies to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    /// Read-receipt flag, flipped once by a non-sender reader.
    pub is_read: bool,
    /// Creation time, unix millis, assigned by the store at persist time.
    pub created_at: u64,
    /// Last mutation time, unix millis.
    pub updated_at: u64,
}

/// Outbound message body as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

impl SendMessageBody {
    /// Plain text message body.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageType::Text,
            media_url: None,
            reply_to_message_id: None,
        }
    }
}

/// Direct (two-party) or group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatType {
    Direct,
    Group,
}

/// Role of a member within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Admin,
    Member,
}

/// Membership record inside a [`Chat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMember {
    pub user_id: String,
    pub role: MemberRole,
}

/// A persisted chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChatType,
    pub members: Vec<ChatMember>,
    /// Most recent message, maintained by the store on append.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Chat {
    /// Whether `user_id` is a member of this chat.
    #[must_use]
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }
}

/// Online/offline state broadcast with `userStatus` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Online,
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_media() {
        assert!(!MessageType::Text.is_media());
        assert!(MessageType::Image.is_media());
        assert!(MessageType::File.is_media());
    }

    #[test]
    fn test_message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::Image).unwrap();
        assert_eq!(json, r#""IMAGE""#);
        let back: MessageType = serde_json::from_str(r#""AUDIO""#).unwrap();
        assert_eq!(back, MessageType::Audio);
    }

    #[test]
    fn test_send_body_defaults() {
        let body: SendMessageBody = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(body.kind, MessageType::Text);
        assert!(body.media_url.is_none());
        assert!(body.reply_to_message_id.is_none());
    }

    #[test]
    fn test_chat_has_member() {
        let chat = Chat {
            id: "c1".into(),
            name: None,
            kind: ChatType::Direct,
            members: vec![
                ChatMember {
                    user_id: "alice".into(),
                    role: MemberRole::Admin,
                },
                ChatMember {
                    user_id: "bob".into(),
                    role: MemberRole::Member,
                },
            ],
            last_message_id: None,
            created_at: 0,
            updated_at: 0,
        };

        assert!(chat.has_member("alice"));
        assert!(!chat.has_member("carol"));
    }
}
