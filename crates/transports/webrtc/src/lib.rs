//! WebRTC substrate and command-line peer for peerdrop
//!
//! This crate connects the substrate-independent pieces of
//! `peerdrop-core` to real networks:
//!
//! - **Substrate**: webrtc-rs peer connections ([`RtcPeerConnector`]) and
//!   data channels ([`RtcDataChannel`])
//! - **Signaling**: a WebSocket connection to the relay ([`connect_relay`])
//! - **Event loop**: [`PeerClient`], one task per peer that handles relay
//!   frames, peer events and user commands in arrival order
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  PeerClientHandle (connect, send, save)      │
//! │  ↓ commands                                  │
//! │  PeerClient event loop                       │
//! │  ├─ Negotiator ── relay frames (WebSocket)   │
//! │  ├─ TransferReceiver ── inbound messages     │
//! │  └─ send worker ── RtcDataChannel            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use peerdrop_webrtc::{PeerClient, PeerConfig};
//!
//! # async fn example() -> peerdrop_core::Result<()> {
//! let handle = PeerClient::start(PeerConfig::default()).await?;
//! handle.wait_for(|status| status.peers.iter().any(|id| id == "xyz")).await?;
//!
//! handle.connect_to("xyz").await?;
//! handle.wait_connected().await?;
//! handle.send_file("notes.txt").await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod signaling;

pub use channel::RtcDataChannel;
pub use client::{PeerClient, PeerClientHandle, PeerStatus};
pub use config::{DataChannelMode, PeerConfig, TurnServerConfig};
pub use connection::{RtcPeerConnector, RtcPeerSession};
pub use signaling::{connect_relay, RelayLink};
