//! Configuration types for transfers and the relay

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default data channel label used by both ends of a session
pub const DEFAULT_CHANNEL_LABEL: &str = "fileTransfer";

/// Default relay port
pub const DEFAULT_RELAY_PORT: u16 = 3000;

/// Transfer engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes read from the source per chunk message (default: 16 KiB)
    pub chunk_size: usize,

    /// Buffered-but-unsent bytes above which the sender pauses (default: 16 KiB)
    pub backpressure_threshold: usize,

    /// Wait between buffered-amount polls in milliseconds (default: 10)
    pub poll_interval_ms: u64,

    /// Label of the outbound data channel (default: "fileTransfer")
    pub channel_label: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
            backpressure_threshold: 16 * 1024,
            poll_interval_ms: 10,
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
        }
    }
}

impl TransferConfig {
    /// Backpressure poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `chunk_size` is zero
    /// - `poll_interval_ms` is zero
    /// - `channel_label` is empty
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "channel_label must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface to bind (default: 0.0.0.0)
    pub host: String,

    /// TCP port to listen on (default: 3000, 0 picks a free port)
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_RELAY_PORT,
        }
    }
}

impl RelayConfig {
    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 16384);
        assert_eq!(config.backpressure_threshold, 16384);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.channel_label, "fileTransfer");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transfer_validation() {
        let config = TransferConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_config_error());

        let config = TransferConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TransferConfig = serde_json::from_str(r#"{"chunk_size": 4096}"#).unwrap();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.backpressure_threshold, 16384);
    }

    #[test]
    fn test_relay_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert!(config.validate().is_ok());
    }
}
