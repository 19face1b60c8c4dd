//! Event types for the Huddle protocol.
//!
//! Events are serialized as JSON objects carrying a `type` discriminant.

use serde::{Deserialize, Serialize};

/// Event kind identifiers, mostly useful for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Welcome,
    Message,
    Clients,
    Presence,
}

impl EventKind {
    /// The `type` tag used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Welcome => "welcome",
            EventKind::Message => "message",
            EventKind::Clients => "clients",
            EventKind::Presence => "presence",
        }
    }
}

/// A chat message as relayed to every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the sending connection.
    pub sender: String,
    /// Message body, exactly as the client sent it.
    #[serde(rename = "message")]
    pub body: String,
}

impl ChatMessage {
    /// Create a new chat message.
    #[must_use]
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }
}

/// An event sent from the server to a single client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Greeting sent once to a freshly opened connection. Never relayed.
    #[serde(rename = "welcome")]
    Welcome {
        /// Human-readable greeting.
        message: String,
    },

    /// A chat message, broadcast to every connection.
    #[serde(rename = "message")]
    Message {
        /// Sender and body.
        data: ChatMessage,
    },

    /// Full roster snapshot, broadcast whenever presence changes.
    #[serde(rename = "clients")]
    Roster {
        /// Display names currently online.
        clients: Vec<String>,
    },
}

impl ServerEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Welcome { .. } => EventKind::Welcome,
            ServerEvent::Message { .. } => EventKind::Message,
            ServerEvent::Roster { .. } => EventKind::Clients,
        }
    }

    /// Create the greeting for a connection named `name`.
    #[must_use]
    pub fn welcome(name: &str) -> Self {
        ServerEvent::Welcome {
            message: format!("Welcome to the chat, {name}!"),
        }
    }

    /// Create a Message event.
    #[must_use]
    pub fn message(data: ChatMessage) -> Self {
        ServerEvent::Message { data }
    }

    /// Create a Roster event from any collection of names.
    #[must_use]
    pub fn roster<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServerEvent::Roster {
            clients: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// An event carried over the shared broadcast channel.
///
/// Only chat messages and the presence-changed signal ever cross process
/// boundaries; rosters are recomputed by every process on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    /// A chat message to deliver to every connection.
    #[serde(rename = "message")]
    Message {
        /// Sender and body.
        data: ChatMessage,
    },

    /// Someone joined or left; every process should re-read the presence
    /// set and push a fresh roster.
    #[serde(rename = "presence")]
    PresenceChanged,
}

impl BusEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::Message { .. } => EventKind::Message,
            BusEvent::PresenceChanged => EventKind::Presence,
        }
    }

    /// Create a Message bus event.
    #[must_use]
    pub fn message(sender: impl Into<String>, body: impl Into<String>) -> Self {
        BusEvent::Message {
            data: ChatMessage::new(sender, body),
        }
    }
}
