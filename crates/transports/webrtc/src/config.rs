//! Peer configuration

use peerdrop_core::{Error, Result, TransferConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration of one peerdrop peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Relay WebSocket URL (default: "ws://localhost:3000")
    pub relay_url: String,

    /// STUN server URLs; empty means host candidates only
    pub stun_servers: Vec<String>,

    /// TURN servers (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Delivery mode of the outbound data channel (default: reliable)
    pub data_channel_mode: DataChannelMode,

    /// Transfer engine settings
    pub transfer: TransferConfig,
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Data channel mode
///
/// Determines the reliability of message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataChannelMode {
    /// Reliable, ordered delivery (default)
    #[default]
    Reliable,
    /// Unordered delivery without retransmits
    ///
    /// Transfers rely on ordered, lossless delivery; this mode is only
    /// useful for experimenting with lossy links.
    Unreliable,
}

impl DataChannelMode {
    /// Get the ordered setting for webrtc-rs
    pub fn ordered(&self) -> bool {
        match self {
            DataChannelMode::Reliable => true,
            DataChannelMode::Unreliable => false,
        }
    }

    /// Get the max retransmits setting for webrtc-rs
    pub fn max_retransmits(&self) -> Option<u16> {
        match self {
            DataChannelMode::Reliable => None,
            DataChannelMode::Unreliable => Some(0),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://localhost:{}", peerdrop_core::DEFAULT_RELAY_PORT),
            stun_servers: Vec::new(),
            turn_servers: Vec::new(),
            data_channel_mode: DataChannelMode::Reliable,
            transfer: TransferConfig::default(),
        }
    }
}

impl PeerConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `relay_url` is not a WebSocket URL
    /// - a STUN URL does not start with `stun:` or `stuns:`
    /// - the transfer settings are invalid
    pub fn validate(&self) -> Result<()> {
        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must start with ws:// or wss://, got {}",
                self.relay_url
            )));
        }

        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server URL must start with stun: or stuns:, got {}",
                url
            )));
        }

        if self.data_channel_mode == DataChannelMode::Unreliable {
            warn!("Unreliable data channel mode: chunks may be lost or reordered");
        }

        self.transfer.validate()
    }
}
