//! Relay signaling protocol types
//!
//! Every relay frame is a JSON text message shaped as
//! `{"event": <name>, "data": <payload>}`. Clients address a target; the
//! relay replaces the target with the true sender before forwarding.

use crate::registry::ClientSnapshot;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Opaque, server-assigned connection identity
pub type ClientId = String;

/// SDP type carried alongside a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description in the browser `RTCSessionDescriptionInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Frames sent by a client to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// relayOffer
    Offer {
        target: ClientId,
        offer: SessionDescription,
    },
    /// relayAnswer
    Answer {
        target: ClientId,
        answer: SessionDescription,
    },
    /// relayIceCandidate
    IceCandidate {
        target: ClientId,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    /// Identity this frame is addressed to
    pub fn target(&self) -> &str {
        match self {
            ClientMessage::Offer { target, .. }
            | ClientMessage::Answer { target, .. }
            | ClientMessage::IceCandidate { target, .. } => target,
        }
    }

    /// Re-tag the payload with the true sender for delivery to the target
    pub fn into_forwarded(self, sender: ClientId) -> ServerMessage {
        match self {
            ClientMessage::Offer { offer, .. } => ServerMessage::Offer { sender, offer },
            ClientMessage::Answer { answer, .. } => ServerMessage::Answer { sender, answer },
            ClientMessage::IceCandidate { candidate, .. } => {
                ServerMessage::IceCandidate { sender, candidate }
            }
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Frames sent by the relay to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First frame on every connection: the identity the relay assigned
    Connected { id: ClientId },
    /// Full registry snapshot, re-sent on every membership change
    Clients(ClientSnapshot),
    Offer {
        sender: ClientId,
        offer: SessionDescription,
    },
    Answer {
        sender: ClientId,
        answer: SessionDescription,
    },
    IceCandidate {
        sender: ClientId,
        candidate: IceCandidate,
    },
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Clients(_) => "clients",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
