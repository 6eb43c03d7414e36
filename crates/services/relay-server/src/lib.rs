//! peerdrop signaling relay
//!
//! Every WebSocket connection is assigned an identity, announced to every
//! other connection through `clients` snapshots, and may address `offer`,
//! `answer` and `ice-candidate` frames to any other identity. The relay never
//! sees file contents; all state lives in memory.
//!
//! ```no_run
//! use peerdrop_core::RelayConfig;
//! use peerdrop_relay::RelayServer;
//!
//! # async fn run() -> peerdrop_core::Result<()> {
//! let relay = RelayServer::bind(RelayConfig::default()).await?;
//! println!("relay on {}", relay.local_addr());
//! relay.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod handler;
pub mod hub;
pub mod server;

pub use hub::{FrameSender, Hub};
pub use server::{RelayServer, RelayServerHandle};
