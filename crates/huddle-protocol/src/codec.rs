//! JSON codec for Huddle events.
//!
//! Client-facing events are encoded as text frames; bus events are encoded
//! to raw bytes for the pub/sub backend.

use bytes::Bytes;
use thiserror::Error;

use crate::events::{BusEvent, ServerEvent};

/// Maximum accepted size of a bus payload (1 MiB).
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    TooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a client-facing event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a client-facing event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the text is not a valid event.
pub fn decode_server(text: &str) -> Result<ServerEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a bus event to bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_bus(event: &BusEvent) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

/// Decode a bus event from bytes.
///
/// # Errors
///
/// Returns an error if the payload is too large or not a valid event.
pub fn decode_bus(data: &[u8]) -> Result<BusEvent, ProtocolError> {
    if data.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChatMessage;
    use serde_json::{json, Value};

    fn as_json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_server_event_wire_shapes() {
        let welcome = encode_server(&ServerEvent::Welcome {
            message: "hello".into(),
        })
        .unwrap();
        assert_eq!(as_json(&welcome), json!({"type": "welcome", "message": "hello"}));

        let message = encode_server(&ServerEvent::message(ChatMessage::new("bob", "hi"))).unwrap();
        assert_eq!(
            as_json(&message),
            json!({"type": "message", "data": {"sender": "bob", "message": "hi"}})
        );

        let roster = encode_server(&ServerEvent::roster(["alice", "bob"])).unwrap();
        assert_eq!(
            as_json(&roster),
            json!({"type": "clients", "clients": ["alice", "bob"]})
        );
    }

    #[test]
    fn test_bus_message_matches_client_message() {
        let bus = encode_bus(&BusEvent::message("bob", "hi")).unwrap();
        let client = encode_server(&ServerEvent::message(ChatMessage::new("bob", "hi"))).unwrap();
        assert_eq!(&bus[..], client.as_bytes());
    }

    #[test]
    fn test_presence_signal_shape() {
        let bus = encode_bus(&BusEvent::PresenceChanged).unwrap();
        assert_eq!(&bus[..], br#"{"type":"presence"}"#);
        assert_eq!(decode_bus(&bus).unwrap(), BusEvent::PresenceChanged);
    }

    #[test]
    fn test_body_preserved_verbatim() {
        let body = "  multi\nline \"quoted\" ünïcödé 🚀 ";
        let bus = encode_bus(&BusEvent::message("bob", body)).unwrap();
        match decode_bus(&bus).unwrap() {
            BusEvent::Message { data } => {
                assert_eq!(data.sender, "bob");
                assert_eq!(data.body, body);
            }
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode_bus(b"not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode_bus(br#"{"type":"shout","text":"hi"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode_bus(br#"{"type":"message","data":{"sender":"bob"}}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_decode_too_large() {
        let payload = vec![b' '; MAX_EVENT_SIZE + 1];
        match decode_bus(&payload) {
            Err(ProtocolError::TooLarge(size)) => assert_eq!(size, MAX_EVENT_SIZE + 1),
            other => panic!("Expected TooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_server_event() {
        let event = decode_server(r#"{"type":"clients","clients":["bob"]}"#).unwrap();
        assert_eq!(event, ServerEvent::roster(["bob"]));
    }
}
