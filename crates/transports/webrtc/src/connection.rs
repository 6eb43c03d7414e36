//! webrtc-rs peer connections as negotiation sessions

use crate::channel::{forward_channel_events, RtcDataChannel};
use crate::config::PeerConfig;
use async_trait::async_trait;
use peerdrop_core::{
    Error, IceCandidate, PeerConnector, PeerEvent, PeerEventSender, PeerSession, Result, Role,
    SessionDescription,
};
use peerdrop_core::protocol::SdpType;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Creates webrtc-rs peer connections from a [`PeerConfig`]
#[derive(Debug, Clone)]
pub struct RtcPeerConnector {
    config: PeerConfig,
}

impl RtcPeerConnector {
    pub fn new(config: PeerConfig) -> Self {
        Self { config }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers: Vec<RTCIceServer> = self
            .config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(self.config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    type Session = RtcPeerSession;
    type Channel = RtcDataChannel;

    #[instrument(skip(self, events))]
    async fn connect(
        &self,
        role: Role,
        events: PeerEventSender<RtcDataChannel>,
    ) -> Result<RtcPeerSession> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnection(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(self.rtc_configuration())
                .await
                .map_err(|e| {
                    Error::PeerConnection(format!("Failed to create peer connection: {}", e))
                })?,
        );

        // Handlers go in before any description exists so no candidate is missed
        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete");
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(PeerEvent::LocalCandidate(from_rtc_candidate(init)));
                    }
                    Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                }
            })
        }));

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    debug!("Peer connection state: {}", state);
                    if state == RTCPeerConnectionState::Failed {
                        let _ = events.send(PeerEvent::ConnectionFailed(
                            "peer connection failed".to_string(),
                        ));
                    }
                })
            },
        ));

        match role {
            Role::Initiator => {
                let mode = self.config.data_channel_mode;
                let init = RTCDataChannelInit {
                    ordered: Some(mode.ordered()),
                    max_retransmits: mode.max_retransmits(),
                    ..Default::default()
                };
                let rtc_channel = peer_connection
                    .create_data_channel(&self.config.transfer.channel_label, Some(init))
                    .await
                    .map_err(|e| {
                        Error::PeerConnection(format!("Failed to create data channel: {}", e))
                    })?;
                forward_channel_events(&rtc_channel, events);
            }
            Role::Responder => {
                peer_connection.on_data_channel(Box::new(move |rtc_channel| {
                    let events = events.clone();
                    Box::pin(async move {
                        info!(
                            "Remote data channel: label={}, id={}",
                            rtc_channel.label(),
                            rtc_channel.id()
                        );
                        forward_channel_events(&rtc_channel, events);
                    })
                }));
            }
        }

        Ok(RtcPeerSession { peer_connection })
    }
}

/// One webrtc-rs peer connection
pub struct RtcPeerSession {
    peer_connection: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerSession for RtcPeerSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to close peer connection: {}", e)))
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(Error::Sdp("rollback descriptions are not supported".to_string()))
        }
    };
    converted.map_err(|e| Error::Sdp(format!("Invalid session description: {}", e)))
}

fn to_rtc_candidate(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnServerConfig;

    #[test]
    fn test_candidate_conversion_keeps_fields() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 192.168.1.2 50000 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: Some("abcd".to_string()),
        };
        assert_eq!(from_rtc_candidate(to_rtc_candidate(candidate.clone())), candidate);
    }

    #[test]
    fn test_rollback_rejected() {
        let description = SessionDescription {
            sdp_type: SdpType::Rollback,
            sdp: String::new(),
        };
        assert!(matches!(to_rtc_description(description), Err(Error::Sdp(_))));
    }

    #[test]
    fn test_ice_servers_from_config() {
        let connector = RtcPeerConnector::new(PeerConfig {
            stun_servers: vec!["stun:stun.example.org:3478".to_string()],
            turn_servers: vec![TurnServerConfig {
                url: "turn:turn.example.org:3478".to_string(),
                username: "user".to_string(),
                credential: "secret".to_string(),
            }],
            ..Default::default()
        });

        let rtc = connector.rtc_configuration();
        assert_eq!(rtc.ice_servers.len(), 2);
        assert_eq!(rtc.ice_servers[1].username, "user");
    }

    #[tokio::test]
    async fn test_offer_answer_between_local_connections() {
        let connector = RtcPeerConnector::new(PeerConfig::default());
        let (initiator_tx, _initiator_rx) = tokio::sync::mpsc::unbounded_channel();
        let (responder_tx, _responder_rx) = tokio::sync::mpsc::unbounded_channel();

        let initiator = connector.connect(Role::Initiator, initiator_tx).await.unwrap();
        let responder = connector.connect(Role::Responder, responder_tx).await.unwrap();

        let offer = initiator.create_offer().await.unwrap();
        assert!(offer.sdp.contains("m=application"));

        responder.set_remote_description(offer).await.unwrap();
        let answer = responder.create_answer().await.unwrap();
        initiator.set_remote_description(answer).await.unwrap();

        initiator.close().await.unwrap();
        responder.close().await.unwrap();
    }
}
