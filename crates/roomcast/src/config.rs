//! Server configuration, optionally loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working local server:
//!
//! ```toml
//! bind_addr = "0.0.0.0:9000"
//! log_filter = "roomcast=debug,info"
//! max_message_len = 2048
//! max_room_name_len = 64
//! max_dice = 100
//! outbox_capacity = 256
//! handshake_timeout_ms = 10000
//! write_timeout_ms = 10000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors raised while loading or validating a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings for a Roomcast server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Default `tracing` directive, used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Longest accepted chat line, in bytes.
    pub max_message_len: usize,
    /// Longest accepted room name, in characters.
    pub max_room_name_len: usize,
    /// Upper bound for both the dice count and the sides of a `ROLL`.
    pub max_dice: u32,
    /// Envelopes queued per client before it counts as unreachable.
    pub outbox_capacity: usize,
    /// How long a new connection may take to finish its WebSocket upgrade.
    pub handshake_timeout_ms: u64,
    /// How long one frame may take to reach the peer's socket.
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            log_filter: "info".to_string(),
            max_message_len: 2048,
            max_room_name_len: 64,
            max_dice: 100,
            outbox_capacity: 256,
            handshake_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// Reads and validates a TOML config file.
    ///
    /// # Errors
    /// [`ConfigError`] if the file can't be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_addr is empty".into()));
        }
        for (field, value) in [
            ("max_message_len", self.max_message_len),
            ("max_room_name_len", self.max_room_name_len),
            ("max_dice", self.max_dice as usize),
            ("outbox_capacity", self.outbox_capacity),
            ("handshake_timeout_ms", self.handshake_timeout_ms as usize),
            ("write_timeout_ms", self.write_timeout_ms as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
            }
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
