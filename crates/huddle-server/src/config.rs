//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (`HUDDLE_*`, `REDIS_HOST`, `REDIS_PORT`)
//! - TOML configuration file

use anyhow::{Context, Result};
use huddle_core::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Directory of static files served on every other path.
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,

    /// Presence store and broadcast channel backend.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Relay loop tuning.
    #[serde(default)]
    pub relay: RelaySettings,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Which backend holds presence and carries broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Shared Redis server; required for more than one process.
    Redis,
    /// In-process only.
    Memory,
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend kind.
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    /// Redis host.
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port.
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis key of the presence set.
    #[serde(default = "default_presence_key")]
    pub presence_key: String,

    /// Redis pub/sub channel.
    #[serde(default = "default_channel")]
    pub channel: String,
}

/// Relay loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// First resubscribe delay in milliseconds.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum resubscribe delay in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("HUDDLE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    env_parse("HUDDLE_PORT").unwrap_or(8888)
}

fn default_ws_path() -> String {
    "/websocket".to_string()
}

fn default_static_dir() -> Option<PathBuf> {
    std::env::var_os("HUDDLE_STATIC_DIR").map(PathBuf::from)
}

fn default_backend_kind() -> BackendKind {
    match std::env::var("HUDDLE_BACKEND").as_deref() {
        Ok("memory") => BackendKind::Memory,
        _ => BackendKind::Redis,
    }
}

fn default_redis_host() -> String {
    std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_redis_port() -> u16 {
    env_parse("REDIS_PORT").unwrap_or(6379)
}

fn default_presence_key() -> String {
    "online_clients".to_string()
}

fn default_channel() -> String {
    "chat_channel".to_string()
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    30_000 // 30 seconds
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring unparsable environment variable");
            None
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            websocket_path: default_ws_path(),
            static_dir: default_static_dir(),
            backend: BackendConfig::default(),
            relay: RelaySettings::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            presence_key: default_presence_key(),
            channel: default_channel(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl RelaySettings {
    /// Convert to the relay loop's configuration.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

#[cfg(feature = "redis")]
impl BackendConfig {
    /// Connection settings for the Redis backend.
    #[must_use]
    pub fn redis_config(&self) -> huddle_store::RedisConfig {
        huddle_store::RedisConfig {
            presence_key: self.presence_key.clone(),
            channel: self.channel.clone(),
            ..huddle_store::RedisConfig::new(&self.redis_host, self.redis_port)
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "huddle.toml",
            "/etc/huddle/huddle.toml",
            "~/.config/huddle/huddle.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8888);
        assert_eq!(config.websocket_path, "/websocket");
        assert_eq!(config.backend.kind, BackendKind::Redis);
        assert_eq!(config.backend.redis_host, "localhost");
        assert_eq!(config.backend.redis_port, 6379);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8888);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "127.0.0.1"
            port = 9000
            static_dir = "./static"

            [backend]
            kind = "memory"
            redis_host = "cache.internal"

            [relay]
            initial_backoff_ms = 50
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.static_dir, Some(PathBuf::from("./static")));
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.backend.redis_host, "cache.internal");
        assert_eq!(config.backend.channel, "chat_channel");
        assert_eq!(config.relay.initial_backoff_ms, 50);
        assert_eq!(config.relay.max_backoff_ms, 30_000);
    }

    #[test]
    fn test_relay_config_conversion() {
        let settings = RelaySettings {
            initial_backoff_ms: 500,
            max_backoff_ms: 100,
        };
        let relay = settings.relay_config();
        assert_eq!(relay.initial_backoff, Duration::from_millis(500));
        // The cap never undercuts the first delay
        assert_eq!(relay.max_backoff, Duration::from_millis(500));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_config() {
        let backend = BackendConfig {
            kind: BackendKind::Redis,
            redis_host: "cache".into(),
            redis_port: 6380,
            presence_key: "online".into(),
            channel: "chat".into(),
        };
        let redis = backend.redis_config();
        assert_eq!(redis.url, "redis://cache:6380/");
        assert_eq!(redis.presence_key, "online");
        assert_eq!(redis.channel, "chat");
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("HUDDLE_TEST_PORT_GARBAGE", "abc");
        std::env::set_var("HUDDLE_TEST_PORT_VALID", "9100");

        assert_eq!(env_parse::<u16>("HUDDLE_TEST_PORT_GARBAGE"), None);
        assert_eq!(env_parse::<u16>("HUDDLE_TEST_PORT_VALID"), Some(9100));
        assert_eq!(env_parse::<u16>("HUDDLE_TEST_PORT_UNSET"), None);
    }
}
