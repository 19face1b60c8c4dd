//! # huddle-server
//!
//! HTTP/WebSocket front of the Huddle chat relay: configuration, metrics
//! and the axum handlers that bridge sockets to relay sessions.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::{BackendKind, Config};
pub use handlers::{build_node, build_router, run_server, AppState};
