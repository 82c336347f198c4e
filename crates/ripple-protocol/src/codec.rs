//! Codec for encoding and decoding Ripple events.
//!
//! Events are MessagePack-encoded with a 4-byte big-endian length prefix so
//! they survive stream transports that do not preserve message boundaries.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum encoded event size (256 KiB). Chat payloads are small; anything
/// past this is a protocol violation, not a large message.
pub const MAX_EVENT_SIZE: usize = 256 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// Not enough data to decode an event.
    #[error("Incomplete event: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode an event to bytes.
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode<T: Serialize>(event: &T) -> Result<Bytes, ProtocolError> {
    let payload = rmp_serde::to_vec_named(event)?;

    if payload.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(buf.freeze())
}

/// Decode a single event from a complete buffer.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    let event = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?;
    Ok(event)
}

/// Try to decode an event from a stream buffer, advancing it on success.
///
/// Returns `Ok(Some(event))` if a complete event was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the event is too large or invalid.
pub fn decode_from<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    let event = rmp_serde::from_slice(&payload)?;

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ClientEvent, ServerEvent};
    use crate::types::{SendMessageBody, UserStatus};

    #[test]
    fn test_encode_decode_roundtrip() {
        let events = vec![
            ClientEvent::Join {
                user_id: "alice".into(),
            },
            ClientEvent::JoinChat {
                chat_id: "chat1".into(),
            },
            ClientEvent::SendMessage {
                chat_id: "chat1".into(),
                user_id: "alice".into(),
                message: SendMessageBody::text("hello"),
            },
            ClientEvent::MarkAsRead {
                message_id: "m1".into(),
                user_id: "bob".into(),
            },
        ];

        for event in events {
            let encoded = encode(&event).unwrap();
            let decoded: ClientEvent = decode(&encoded).unwrap();
            assert_eq!(event, decoded);
        }
    }

    #[test]
    fn test_server_event_roundtrip() {
        let event = ServerEvent::user_status("alice", UserStatus::Online);
        let encoded = encode(&event).unwrap();
        let decoded: ServerEvent = decode(&encoded).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_decode_incomplete() {
        let event = ClientEvent::Leave {
            user_id: "alice".into(),
        };
        let encoded = encode(&event).unwrap();

        match decode::<ClientEvent>(&encoded[..3]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {other:?}"),
        }
    }

    #[test]
    fn test_event_too_large() {
        let event = ClientEvent::SendMessage {
            chat_id: "chat1".into(),
            user_id: "alice".into(),
            message: SendMessageBody::text("x".repeat(MAX_EVENT_SIZE + 1)),
        };

        match encode(&event) {
            Err(ProtocolError::EventTooLarge(_)) => {}
            other => panic!("Expected EventTooLarge error, got {other:?}"),
        }
    }

    #[test]
    fn test_streaming_decode() {
        let first = ClientEvent::JoinChat {
            chat_id: "chat1".into(),
        };
        let second = ClientEvent::Typing {
            chat_id: "chat1".into(),
            user_id: "alice".into(),
        };

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(&first).unwrap());
        buf.extend_from_slice(&encode(&second).unwrap());

        let decoded1: ClientEvent = decode_from(&mut buf).unwrap().unwrap();
        let decoded2: ClientEvent = decode_from(&mut buf).unwrap().unwrap();

        assert_eq!(first, decoded1);
        assert_eq!(second, decoded2);
        assert!(buf.is_empty());

        // A partial prefix decodes to nothing and leaves the buffer intact.
        buf.extend_from_slice(&[0, 0]);
        assert!(decode_from::<ClientEvent>(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }
}
