//! # huddle-core
//!
//! Connection/broadcast engine for the Huddle chat relay.
//!
//! - **Registry** - per-process set of live connections and their names
//! - **Hub** - the task that exclusively owns the registry
//! - **Relay** - consumes the shared broadcast channel and hands events to the hub
//! - **Session** - per-connection lifecycle (`Connecting -> Open -> Closed`)
//! - **Node** - wires the above together for one serving process
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ publish ┌──────────────────┐ subscribe ┌─────────────┐
//! │   Session   │────────▶│ BroadcastChannel │──────────▶│    Relay    │
//! └─────────────┘         └──────────────────┘           └─────────────┘
//!        │ register/unregister                                  │ deliver
//!        ▼                                                      ▼
//!  ┌─────────────────────────────────────────────────────────────────┐
//!  │              Hub (owns the ConnectionRegistry)                   │
//!  └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The relay never touches the registry: every delivery is a command on the
//! hub's queue, so registry mutation and iteration happen on one task.

pub mod error;
pub mod hub;
pub mod name;
pub mod node;
pub mod registry;
pub mod relay;
pub mod session;

pub use error::RelayError;
pub use hub::{Hub, HubCommand, HubHandle, HubStats};
pub use name::{generate_display_name, resolve_display_name};
pub use node::Node;
pub use registry::{Connection, ConnectionId, ConnectionRegistry, Outbound};
pub use relay::{Backoff, RelayConfig, RelayLoop};
pub use session::{Session, SessionState};
