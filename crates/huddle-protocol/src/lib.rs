//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat relay.
//!
//! Two families of events are defined here:
//!
//! - [`ServerEvent`] - what a connected client receives (`welcome`,
//!   `message`, `clients`)
//! - [`BusEvent`] - what crosses the shared pub/sub channel between serving
//!   processes (`message`, `presence`)
//!
//! Clients never send structured frames: every inbound text frame is a chat
//! message body.
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ChatMessage, ServerEvent};
//!
//! let event = ServerEvent::message(ChatMessage::new("bob", "hi"));
//! let text = codec::encode_server(&event).unwrap();
//! assert_eq!(text, r#"{"type":"message","data":{"sender":"bob","message":"hi"}}"#);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode_bus, decode_server, encode_bus, encode_server, ProtocolError};
pub use events::{BusEvent, ChatMessage, EventKind, ServerEvent};
