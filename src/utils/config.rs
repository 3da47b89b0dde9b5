//! Configuration management for the secure messenger.
//!
//! This module provides TOML-based configuration with support for multiple
//! configuration sources (default, file-based, environment variables) and
//! validation of configuration parameters.

use crate::utils::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "messenger.toml";

/// Environment variable prefix for configuration
pub const ENV_PREFIX: &str = "MESSENGER";

/// Complete configuration for the messenger application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Network configuration
    pub network: NetworkConfig,
    /// Liveness and reconnection configuration
    pub resilience: ResilienceConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Network and transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port to listen on for peer connections
    pub listen_port: u16,
    /// Display name announced to peers
    pub display_name: String,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Enable UDP broadcast discovery
    pub enable_discovery: bool,
    /// UDP port used for broadcast discovery
    pub discovery_port: u16,
    /// Discovery broadcast interval in seconds
    pub discovery_interval: u64,
}

/// Heartbeat and reconnection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Interval between outbound heartbeat pings in seconds
    pub heartbeat_interval: u64,
    /// Seconds without any frame before a peer is declared dead
    pub heartbeat_timeout: u64,
    /// Maximum reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Initial reconnection backoff delay in milliseconds
    pub reconnect_initial_delay_ms: u64,
    /// Upper bound on the reconnection backoff delay in milliseconds
    pub reconnect_max_delay_ms: u64,
}

/// Storage and persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for data storage
    pub data_dir: PathBuf,
    /// Message history file
    pub history_file: PathBuf,
    /// Enable message history persistence
    pub enable_history: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            resilience: ResilienceConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: crate::defaults::DEFAULT_PORT,
            display_name: "Anonymous".to_string(),
            connect_timeout: 30,
            enable_discovery: true,
            discovery_port: crate::defaults::DEFAULT_DISCOVERY_PORT,
            discovery_interval: 5,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: crate::defaults::DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: crate::defaults::DEFAULT_HEARTBEAT_TIMEOUT,
            max_reconnect_attempts: crate::defaults::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_initial_delay_ms: 1000,
            reconnect_max_delay_ms: 30000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("secure-messenger");

        Self {
            history_file: data_dir.join("message_history.json"),
            data_dir,
            enable_history: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl MessengerConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with multiple sources (default, file, environment)
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        } else {
            let default_locations = [
                PathBuf::from(DEFAULT_CONFIG_FILE),
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("secure-messenger")
                    .join(DEFAULT_CONFIG_FILE),
            ];

            for location in &default_locations {
                if location.exists() {
                    config = Self::from_file(location)?;
                    break;
                }
            }
        }

        config = config.merge_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Merge configuration from environment variables
    fn merge_from_env(mut self) -> Result<Self> {
        if let Ok(port) = std::env::var("MESSENGER_NETWORK_LISTEN_PORT") {
            self.network.listen_port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "MESSENGER_NETWORK_LISTEN_PORT".to_string(),
                value: port,
            })?;
        }

        if let Ok(name) = std::env::var("MESSENGER_NETWORK_DISPLAY_NAME") {
            self.network.display_name = name;
        }

        if let Ok(level) = std::env::var("MESSENGER_LOGGING_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(data_dir) = std::env::var("MESSENGER_STORAGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(&data_dir);
            self.storage.history_file = self.storage.data_dir.join("message_history.json");
        }

        Ok(self)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.network.listen_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.listen_port".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.resilience.heartbeat_timeout <= self.resilience.heartbeat_interval {
            return Err(ConfigError::InvalidValue {
                field: "resilience.heartbeat_timeout".to_string(),
                value: self.resilience.heartbeat_timeout.to_string(),
            }
            .into());
        }

        if self.resilience.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resilience.max_reconnect_attempts".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.resilience.reconnect_initial_delay_ms > self.resilience.reconnect_max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "resilience.reconnect_initial_delay_ms".to_string(),
                value: self.resilience.reconnect_initial_delay_ms.to_string(),
            }
            .into());
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    value: self.logging.level.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Ensure the data directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        if !self.storage.data_dir.exists() {
            std::fs::create_dir_all(&self.storage.data_dir).map_err(|_| {
                ConfigError::DirectoryCreation {
                    path: self.storage.data_dir.display().to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Get the configuration as a pretty-printed TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::ParseError {
                reason: e.to_string(),
            }
            .into()
        })
    }
}
