//! Core of peerdrop: browser-style peer-to-peer file transfer
//!
//! This crate holds everything that does not depend on a concrete network
//! stack:
//!
//! - **Relay protocol**: the `{event, data}` frames exchanged with the relay
//!   server, and the connected-client registry it broadcasts
//! - **Negotiation**: the per-client state machine that sets up one peer
//!   session through offer/answer and trickled ICE candidates
//! - **Transfer engine**: metadata-then-chunks framing over a data channel,
//!   with buffered-amount backpressure on send and a per-channel reassembly
//!   cursor on receive
//!
//! The transport substrate plugs in through [`peer::PeerConnector`] and
//! [`transfer::TransferChannel`].
//!
//! # Example
//!
//! ```
//! use peerdrop_core::transfer::{ChannelMessage, ReceivedFiles, TransferReceiver};
//!
//! let mut receiver = TransferReceiver::new();
//! let mut files = ReceivedFiles::new();
//!
//! receiver.on_message(
//!     ChannelMessage::Text(r#"{"fileName":"a.txt","fileSize":5}"#.to_string()),
//!     &mut files,
//! );
//! receiver.on_message(ChannelMessage::Binary(b"hello".to_vec().into()), &mut files);
//!
//! assert_eq!(files.get(0).unwrap().data().as_ref(), b"hello");
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod negotiation;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod testing;
pub mod transfer;

pub use config::{RelayConfig, TransferConfig, DEFAULT_CHANNEL_LABEL, DEFAULT_RELAY_PORT};
pub use error::{Error, Result};
pub use negotiation::{NegotiationState, Negotiator, SessionUpdate};
pub use peer::{PeerConnector, PeerEvent, PeerEventSender, PeerSession, Role};
pub use protocol::{ClientId, ClientMessage, IceCandidate, ServerMessage, SessionDescription};
pub use registry::{ClientRecord, ClientRegistry, ClientSnapshot};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
