//! Error types for the relay core.

use huddle_protocol::ProtocolError;
use huddle_store::StoreError;
use thiserror::Error;

/// Relay errors.
///
/// None of these reach the client as a message; at most the connection is
/// closed.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Handshake refused. Every origin is accepted, so this is never raised.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// I/O failure on an open connection. Handled like a clean disconnect.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An event could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] ProtocolError),

    /// Presence store or broadcast channel unreachable.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The hub task has stopped.
    #[error("Hub is closed")]
    HubClosed,

    /// `open` was called on a session that already left `Connecting`.
    #[error("Session already opened")]
    AlreadyOpened,

    /// Operation requires an open session.
    #[error("Session is not open")]
    NotOpen,
}
