//! Data channel seam used by the transfer engine

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Raw inbound data channel message, as delivered by the substrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// UTF-8 string message
    Text(String),
    /// Binary message
    Binary(Bytes),
}

impl ChannelMessage {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            ChannelMessage::Text(t) => t.len(),
            ChannelMessage::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ChannelMessage::Binary(_))
    }
}

/// Outbound side of a message-oriented, flow-controlled data channel
///
/// Implementations must preserve message order and message boundaries, and
/// report the number of bytes handed to the channel but not yet transmitted.
#[async_trait]
pub trait TransferChannel: Send + Sync {
    /// Channel label (for logging)
    fn label(&self) -> &str;

    /// Whether the channel is open and can accept sends
    async fn is_open(&self) -> bool;

    /// Bytes queued on the channel and not yet sent
    async fn buffered_amount(&self) -> usize;

    /// Send one text message
    async fn send_text(&self, text: String) -> Result<()>;

    /// Send one binary message
    async fn send_binary(&self, data: Bytes) -> Result<()>;
}
