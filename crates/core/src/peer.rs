//! Transport substrate seams
//!
//! A [`PeerConnector`] creates one peer connection per session. Everything
//! the substrate reports asynchronously (local ICE candidates, data channel
//! lifecycle, inbound messages, connection failure) comes back as
//! [`PeerEvent`]s on the sender passed to [`PeerConnector::connect`], which
//! is wired up before any description is produced so no early candidate is
//! lost.

use crate::protocol::{IceCandidate, SessionDescription};
use crate::transfer::{ChannelMessage, TransferChannel};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which side of the negotiation a session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the data channel and the offer
    Initiator,
    /// Receives the offer and the remotely created data channel
    Responder,
}

/// Asynchronous notification from a peer connection
#[derive(Debug)]
pub enum PeerEvent<Ch> {
    /// Locally gathered ICE candidate, to be relayed to the remote peer
    LocalCandidate(IceCandidate),
    /// Data channel reached the open state
    ChannelOpen(Arc<Ch>),
    /// Inbound data channel message
    ChannelMessage(ChannelMessage),
    /// Data channel closed
    ChannelClosed,
    /// Transport reported a terminal connection failure
    ConnectionFailed(String),
}

/// Sender half handed to the substrate for one session
pub type PeerEventSender<Ch> = mpsc::UnboundedSender<PeerEvent<Ch>>;

/// One peer connection
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Produce an offer and commit it as the local description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Produce an answer and commit it as the local description
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Commit the remote peer's description
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Apply a remote ICE candidate; only valid after the remote description
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Tear the connection down
    async fn close(&self) -> Result<()>;
}

/// Factory for peer sessions on a concrete transport substrate
#[async_trait]
pub trait PeerConnector: Send + Sync {
    type Session: PeerSession + 'static;
    type Channel: TransferChannel + 'static;

    /// Create a connection for `role`, delivering its events on `events`
    ///
    /// An initiator's connection creates the outbound data channel here.
    async fn connect(
        &self,
        role: Role,
        events: PeerEventSender<Self::Channel>,
    ) -> Result<Self::Session>;
}
