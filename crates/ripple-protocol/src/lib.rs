//! # ripple-protocol
//!
//! Wire protocol definitions for the Ripple chat engine.
//!
//! This crate defines the event vocabulary exchanged between chat clients
//! and the server, the domain records they carry, and the codec used to
//! put them on the wire.
//!
//! ## Events
//!
//! - `join` / `leave` - Bind a user to a connection, presence transitions
//! - `joinChat` / `leaveChat` - Room subscription
//! - `sendMessage` - Persist and fan out a message
//! - `typing` / `stopTyping` - Composing indicators
//! - `markAsRead` - Read receipts
//!
//! ## Example
//!
//! ```rust
//! use ripple_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::JoinChat { chat_id: "chat:lobby".into() };
//!
//! let encoded = codec::encode(&event).unwrap();
//! let decoded: ClientEvent = codec::decode(&encoded).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;
pub mod types;

pub use codec::{decode, decode_from, encode, ProtocolError};
pub use events::{ClientEvent, ServerEvent};
pub use types::{
    Chat, ChatMember, ChatType, MemberRole, Message, MessageType, SendMessageBody, UserStatus,
    MAX_CONTENT_LENGTH,
};
