//! Server-side counters for Huddle.
//!
//! Counts client sockets and chat traffic per direction. A Prometheus
//! scrape endpoint is served on its own port.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Names of every series this server exports.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "huddle_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "huddle_connections_active";
    pub const MESSAGES_TOTAL: &str = "huddle_messages_total";
    pub const MESSAGES_BYTES: &str = "huddle_messages_bytes";
    pub const ERRORS_TOTAL: &str = "huddle_errors_total";
}

/// Register descriptions for the Huddle series.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "WebSocket clients accepted since start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "WebSocket clients currently attached"
    );
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Chat frames exchanged with clients, by direction"
    );
    metrics::describe_counter!(names::MESSAGES_BYTES, "Payload bytes of chat frames, by direction");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Handler failures, by kind");

    info!("Metric descriptions registered");
}

/// Install the Prometheus recorder with a scrape listener on `port`.
///
/// # Errors
///
/// Fails if a recorder is already installed or the port cannot be bound.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Prometheus scrape endpoint on http://{}/metrics", addr);
    Ok(())
}

/// Count an accepted client.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Count a detached client.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Count one chat frame of `bytes` length.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Count a handler failure.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Keeps the active-client gauge in step with one socket task.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Count the client as accepted until the guard drops.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
