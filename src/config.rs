//! # Configuration Management
//!
//! Centralized configuration for the UDP multiplexer.
//!
//! This module provides structured configuration for socket creation, the receive
//! loop, the shared event stream and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Receive Buffer
//! The default receive buffer (65535 bytes) is larger than the biggest possible UDP
//! payload, so default sockets never truncate. Smaller buffers are allowed; a datagram
//! that fills one completely is reported as possibly truncated.

use crate::error::{MultiplexError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Largest payload a single UDP datagram can carry over IPv4 (65535 - 8 - 20)
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default receive buffer size in bytes
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65_535;

/// Default delay before a receive loop retries after a transient error
pub const DEFAULT_RECEIVE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default number of consecutive receive failures before a socket is closed
pub const DEFAULT_MAX_RECEIVE_RETRIES: u32 = 10;

/// Default per-subscriber event buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default maximum number of simultaneously open sockets
pub const DEFAULT_MAX_SOCKETS: usize = 1024;

/// Main multiplexer configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MultiplexerConfig {
    /// Socket creation and receive loop configuration
    #[serde(default)]
    pub socket: SocketConfig,

    /// Event stream configuration
    #[serde(default)]
    pub events: EventConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MultiplexerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| MultiplexError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| MultiplexError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| MultiplexError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("UDP_MUX_BIND_ADDRESS") {
            config.socket.bind_address = addr;
        }

        if let Ok(reuse) = std::env::var("UDP_MUX_REUSE_ADDRESS") {
            if let Ok(val) = reuse.parse::<bool>() {
                config.socket.reuse_address = val;
            }
        }

        if let Ok(size) = std::env::var("UDP_MUX_RECV_BUFFER_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.socket.recv_buffer_size = val;
            }
        }

        if let Ok(backoff) = std::env::var("UDP_MUX_RETRY_BACKOFF_MS") {
            if let Ok(val) = backoff.parse::<u64>() {
                config.socket.receive_retry_backoff = Duration::from_millis(val);
            }
        }

        if let Ok(retries) = std::env::var("UDP_MUX_MAX_RECEIVE_RETRIES") {
            if let Ok(val) = retries.parse::<u32>() {
                config.socket.max_receive_retries = val;
            }
        }

        if let Ok(max) = std::env::var("UDP_MUX_MAX_SOCKETS") {
            if let Ok(val) = max.parse::<usize>() {
                config.socket.max_sockets = val;
            }
        }

        if let Ok(capacity) = std::env::var("UDP_MUX_EVENT_CAPACITY") {
            if let Ok(val) = capacity.parse::<usize>() {
                config.events.channel_capacity = val;
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
            .map_err(|e| MultiplexError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| MultiplexError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.socket.validate());
        errors.extend(self.events.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MultiplexError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Socket creation and receive loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocketConfig {
    /// Local address sockets bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub bind_address: String,

    /// Set SO_REUSEADDR before binding
    pub reuse_address: bool,

    /// Size of the buffer each receive call reads into
    pub recv_buffer_size: usize,

    /// Largest payload `send` accepts
    pub max_datagram_size: usize,

    /// Delay before retrying after a transient receive error
    #[serde(with = "duration_serde")]
    pub receive_retry_backoff: Duration,

    /// Consecutive receive failures tolerated before the socket is closed (0 = unlimited)
    pub max_receive_retries: u32,

    /// Maximum number of simultaneously open sockets (1 = single-socket session)
    pub max_sockets: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            reuse_address: true,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_datagram_size: MAX_UDP_PAYLOAD,
            receive_retry_backoff: DEFAULT_RECEIVE_RETRY_BACKOFF,
            max_receive_retries: DEFAULT_MAX_RECEIVE_RETRIES,
            max_sockets: DEFAULT_MAX_SOCKETS,
        }
    }
}

impl SocketConfig {
    /// Validate socket configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address: '{}' (expected an IP such as '0.0.0.0')",
                self.bind_address
            ));
        }

        if self.recv_buffer_size == 0 {
            errors.push("Receive buffer size must be greater than 0".to_string());
        } else if self.recv_buffer_size > 1024 * 1024 {
            errors.push(format!(
                "Receive buffer size too large: {} bytes (maximum: 1 MB)",
                self.recv_buffer_size
            ));
        }

        if self.max_datagram_size == 0 {
            errors.push("Max datagram size must be greater than 0".to_string());
        } else if self.max_datagram_size > MAX_UDP_PAYLOAD {
            errors.push(format!(
                "Max datagram size too large: {} bytes (UDP maximum: {MAX_UDP_PAYLOAD})",
                self.max_datagram_size
            ));
        }

        if self.receive_retry_backoff.as_millis() < 10 {
            errors.push("Receive retry backoff too short (minimum: 10ms)".to_string());
        } else if self.receive_retry_backoff.as_secs() > 60 {
            errors.push("Receive retry backoff too long (maximum: 60s)".to_string());
        }

        if self.max_sockets == 0 {
            errors.push("Max sockets must be greater than 0".to_string());
        } else if self.max_sockets > 65_535 {
            errors.push(format!(
                "Max sockets too large: {} (there are only 65535 ports)",
                self.max_sockets
            ));
        }

        errors
    }

    /// Parsed bind address; only valid after `validate` passes
    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_address
            .parse::<IpAddr>()
            .map_err(|_| MultiplexError::InvalidBindAddress(self.bind_address.clone()))
    }
}

/// Event stream configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    /// Per-subscriber buffer; events arriving while it is full are dropped
    pub channel_capacity: usize,

    /// Whether the latest-value lifecycle channel is updated
    pub lifecycle_enabled: bool,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_EVENT_CAPACITY,
            lifecycle_enabled: true,
        }
    }
}

impl EventConfig {
    /// Validate event configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.channel_capacity == 0 {
            errors.push("Event channel capacity must be greater than 0".to_string());
        } else if self.channel_capacity > 1_000_000 {
            errors.push(format!(
                "Event channel capacity too large: {} (max recommended: 1,000,000)",
                self.channel_capacity
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("udp-multiplexer"),
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
