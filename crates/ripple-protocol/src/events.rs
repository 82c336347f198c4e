//! Event types for the Ripple protocol.
//!
//! Every event a client may send or receive is an explicit enum variant,
//! so the event contract is checked at compile time rather than through a
//! loosely-typed payload bag. The `event` tag and camelCase payload fields
//! are the wire contract.

use serde::{Deserialize, Serialize};

use crate::types::{Message, SendMessageBody, UserStatus};

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind the connection to a user and mark them online.
    #[serde(rename_all = "camelCase")]
    Join { user_id: String },

    /// Unbind the user and mark them offline.
    #[serde(rename_all = "camelCase")]
    Leave { user_id: String },

    /// Subscribe this connection to a chat's broadcast room.
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_id: String },

    /// Unsubscribe from a chat's broadcast room.
    #[serde(rename_all = "camelCase")]
    LeaveChat { chat_id: String },

    /// Persist a message and fan it out to the chat room.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        chat_id: String,
        user_id: String,
        message: SendMessageBody,
    },

    /// Composing indicator, relayed to the room without echo.
    #[serde(rename_all = "camelCase")]
    Typing { chat_id: String, user_id: String },

    /// Composing stopped, relayed to the room without echo.
    #[serde(rename_all = "camelCase")]
    StopTyping { chat_id: String, user_id: String },

    /// Flip a message's read receipt.
    #[serde(rename_all = "camelCase")]
    MarkAsRead {
        message_id: String,
        user_id: String,
    },
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A user went online or offline. Broadcast to every connection.
    #[serde(rename_all = "camelCase")]
    UserStatus { user_id: String, status: UserStatus },

    /// A new message landed in a chat this connection subscribes to.
    #[serde(rename_all = "camelCase")]
    NewMessage { chat_id: String, message: Message },

    /// Someone else in the room started composing.
    #[serde(rename_all = "camelCase")]
    Typing { chat_id: String, user_id: String },

    /// Composing stopped (explicitly, or implied by a sent message).
    #[serde(rename_all = "camelCase")]
    TypingStop { chat_id: String, user_id: String },

    /// A message was read by a chat participant.
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: String,
        user_id: String,
    },

    /// An operation initiated by this connection failed.
    #[serde(rename_all = "camelCase")]
    Error { message: String, error: String },
}

impl ServerEvent {
    /// Presence-change event.
    #[must_use]
    pub fn user_status(user_id: impl Into<String>, status: UserStatus) -> Self {
        ServerEvent::UserStatus {
            user_id: user_id.into(),
            status,
        }
    }

    /// Message fan-out event.
    #[must_use]
    pub fn new_message(chat_id: impl Into<String>, message: Message) -> Self {
        ServerEvent::NewMessage {
            chat_id: chat_id.into(),
            message,
        }
    }

    /// Typing indicator.
    #[must_use]
    pub fn typing(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ServerEvent::Typing {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Typing-stopped indicator.
    #[must_use]
    pub fn typing_stop(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ServerEvent::TypingStop {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Read receipt.
    #[must_use]
    pub fn message_read(message_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        ServerEvent::MessageRead {
            message_id: message_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Per-connection failure report.
    #[must_use]
    pub fn error(message: impl Into<String>, error: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    #[test]
    fn test_client_event_tags() {
        let event = ClientEvent::JoinChat {
            chat_id: "chat1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "joinChat");
        assert_eq!(json["chatId"], "chat1");
    }

    #[test]
    fn test_send_message_wire_shape() {
        let json = r#"{
            "event": "sendMessage",
            "chatId": "chat1",
            "userId": "alice",
            "message": {"content": "hi", "type": "TEXT"}
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage {
                chat_id,
                user_id,
                message,
            } => {
                assert_eq!(chat_id, "chat1");
                assert_eq!(user_id, "alice");
                assert_eq!(message.content, "hi");
                assert_eq!(message.kind, MessageType::Text);
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_server_event_tags() {
        let event = ServerEvent::typing_stop("chat1", "alice");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "typingStop");
        assert_eq!(json["userId"], "alice");

        let status = ServerEvent::user_status("bob", UserStatus::Offline);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["event"], "userStatus");
        assert_eq!(json["status"], "OFFLINE");
    }
}
