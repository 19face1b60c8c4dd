//! # Huddle Server
//!
//! Realtime group-chat relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run against Redis on localhost:6379, listening on 8888
//! huddle
//!
//! # Run with environment overrides
//! HUDDLE_PORT=9000 REDIS_HOST=cache.internal huddle
//!
//! # Single process, no Redis
//! HUDDLE_BACKEND=memory huddle
//! ```

use anyhow::Result;
use huddle_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting Huddle server on {}:{} ({:?} backend)",
        config.host,
        config.port,
        config.backend.kind
    );

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
