//! # Configuration Management
//!
//! Centralized configuration for the frame server.
//!
//! This module provides the wire and capacity constants plus a structured
//! [`Config`] covering the listener, the event bus, resource files and logging.
//!
//! ## Configuration Sources
//! - TOML files via [`Config::from_file`]
//! - Environment variables via [`Config::from_env`] (`FRAMEGATE_*`)
//! - Direct instantiation with defaults
//!
//! ## Limits
//! - The connection registry is fixed-size; connections past `max_players`
//!   are closed right after the handshake
//! - Frames announcing more than `max_payload_size` bytes tear the
//!   connection down before any allocation happens

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Registry capacity (maximum concurrent connections)
pub const MAX_PLAYERS: usize = 10_000;

/// Listen backlog passed to `listen(2)`
pub const SOCKET_BACKLOG: u32 = 1000;

/// Bytes read for the handshake request
pub const HANDSHAKE_BUFFER: usize = 4096;

/// Initial receive buffer per connection
pub const DATA_BUFFER: usize = 8192;

/// GUID appended to the client key before hashing
pub const HANDSHAKE_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Max allowed payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Bounded wait for event bus locks
pub const EVENT_LOCK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Packet handlers running longer than this are reported
pub const SLOW_HANDLER_THRESHOLD: Duration = Duration::from_millis(1000);

/// Time allowed for a client to send its handshake request
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default listen address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

/// Default listen port
pub const DEFAULT_PORT: u16 = 9200;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listener and connection settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Event bus settings
    #[serde(default)]
    pub events: EventConfig,

    /// Resource file locations
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FRAMEGATE_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(port) = std::env::var("FRAMEGATE_PORT") {
            config.server.port = port
                .parse::<u16>()
                .map_err(|e| ProtocolError::ConfigError(format!("Invalid FRAMEGATE_PORT: {e}")))?;
        }

        if let Ok(max) = std::env::var("FRAMEGATE_MAX_PLAYERS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_players = val;
            }
        }

        if let Ok(path) = std::env::var("FRAMEGATE_LANGUAGE_FILE") {
            config.resources.language_file = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("FRAMEGATE_LOG_LEVEL") {
            if let Ok(val) = level.parse::<Level>() {
                config.logging.log_level = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.events.validate());
        errors.extend(self.resources.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener and per-connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address without port (e.g., "127.0.0.1")
    pub address: String,

    /// Listen port; 0 picks an ephemeral port
    pub port: u16,

    /// Registry capacity
    pub max_players: usize,

    /// Listen backlog
    pub backlog: u32,

    /// Bytes read for the handshake request
    pub handshake_buffer: usize,

    /// Initial receive buffer per connection
    pub data_buffer: usize,

    /// Largest accepted frame payload
    pub max_payload_size: usize,

    /// Time allowed for the handshake request to arrive
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Packet handlers above this duration are logged as slow
    #[serde(with = "duration_serde")]
    pub slow_handler_threshold: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            port: DEFAULT_PORT,
            max_players: MAX_PLAYERS,
            backlog: SOCKET_BACKLOG,
            handshake_buffer: HANDSHAKE_BUFFER,
            data_buffer: DATA_BUFFER,
            max_payload_size: MAX_PAYLOAD_SIZE,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            slow_handler_threshold: SLOW_HANDLER_THRESHOLD,
        }
    }
}

impl ServerConfig {
    /// Resolve `address:port` into a socket address.
    ///
    /// Returns `None` when the address does not parse, which the acceptor
    /// treats as an absent endpoint.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.address, self.port).parse().ok()
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.endpoint().is_none() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected an IP such as '0.0.0.0')",
                self.address
            ));
        }

        if self.max_players == 0 {
            errors.push("Max players must be greater than 0".to_string());
        } else if self.max_players > 100_000 {
            errors.push(format!(
                "Max players very high: {} (ensure system resources can support this)",
                self.max_players
            ));
        }

        if self.backlog == 0 {
            errors.push("Socket backlog must be greater than 0".to_string());
        }

        if self.handshake_buffer < 256 {
            errors.push("Handshake buffer too small (minimum: 256 bytes)".to_string());
        }

        if self.data_buffer < 128 {
            errors.push("Data buffer too small (minimum: 128 bytes)".to_string());
        }

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload_size
            ));
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 60 {
            errors.push("Handshake timeout too long (maximum: 60s)".to_string());
        }

        if self.slow_handler_threshold.is_zero() {
            errors.push("Slow handler threshold must be greater than 0".to_string());
        }

        errors
    }
}

/// Event bus settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    /// Bounded wait for handler collection locks
    #[serde(with = "duration_serde")]
    pub lock_timeout: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            lock_timeout: EVENT_LOCK_TIMEOUT,
        }
    }
}

impl EventConfig {
    /// Validate event bus configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.lock_timeout.is_zero() {
            errors.push("Event lock timeout must be greater than 0".to_string());
        } else if self.lock_timeout.as_secs() > 60 {
            errors.push("Event lock timeout too long (maximum: 60s)".to_string());
        }
        errors
    }
}

/// Resource file locations
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ResourceConfig {
    /// `key:value` language table; unset means keys render as themselves
    #[serde(default)]
    pub language_file: Option<PathBuf>,
}

impl ResourceConfig {
    /// Validate resource configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(ref path) = self.language_file {
            if path.as_os_str().is_empty() {
                errors.push("Language file path cannot be empty".to_string());
            }
        }
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level, overridden by `RUST_LOG` when set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("framegate"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
