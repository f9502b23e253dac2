//! ferry.toml server configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest read buffer hyper accepts.
const MIN_HEADER_BYTES: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to accept connections on.
    pub listen: SocketAddr,
    /// Upper bound on the request head size, in bytes.
    pub max_header_bytes: usize,
    /// Keep HTTP/1.1 connections open between requests.
    pub keep_alive: bool,
    /// Close connections that do not finish sending a request head in time.
    pub header_read_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_header_bytes: 1 << 20,
            keep_alive: true,
            header_read_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values hyper would reject or that make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_header_bytes < MIN_HEADER_BYTES {
            return Err(ConfigError::Invalid(format!(
                "max_header_bytes must be at least {MIN_HEADER_BYTES}, got {}",
                self.max_header_bytes
            )));
        }
        if self.header_read_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "header_read_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Header read timeout, if one is configured.
    pub fn header_read_timeout(&self) -> Option<Duration> {
        self.header_read_timeout_secs.map(Duration::from_secs)
    }
}
