//! Peer negotiation state machine
//!
//! One [`Negotiator`] per client drives at most one peer session at a time.
//! Initiator path: `Idle -> OfferCreated -> AwaitingAnswer -> Connected`.
//! Responder path: `Idle -> OfferReceived -> AnswerCreated -> Connected`.
//! Any state moves to `Failed` when the substrate reports a terminal failure
//! or a description cannot be produced or committed; [`Negotiator::reset`]
//! returns to `Idle`.
//!
//! Remote ICE candidates that arrive before the remote description is
//! committed are queued and applied, in arrival order, right after it.

use crate::peer::{PeerConnector, PeerEvent, PeerSession, Role};
use crate::protocol::{ClientId, ClientMessage, IceCandidate, ServerMessage, SessionDescription};
use crate::registry::ClientRegistry;
use crate::transfer::{ChannelMessage, TransferChannel};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Remote candidates held while no remote description is committed
const MAX_PENDING_CANDIDATES: usize = 64;

/// Negotiation state of the client's single peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferCreated,
    AwaitingAnswer,
    OfferReceived,
    AnswerCreated,
    Connected,
    Failed,
}

impl NegotiationState {
    /// Whether a session exists and has not failed
    pub fn is_active(&self) -> bool {
        !matches!(self, NegotiationState::Idle | NegotiationState::Failed)
    }

    /// Whether a session is being negotiated but not connected yet
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            NegotiationState::OfferCreated
                | NegotiationState::AwaitingAnswer
                | NegotiationState::OfferReceived
                | NegotiationState::AnswerCreated
        )
    }
}

/// What a handled message or event means for the caller
#[derive(Debug)]
pub enum SessionUpdate {
    /// Nothing the caller needs to act on
    None,
    /// Registry snapshot changed
    PeersChanged,
    /// Data channel usable
    Connected,
    /// Inbound data channel message, for the transfer receiver
    Message(ChannelMessage),
    /// Session ended and the negotiator is back in `Idle`
    Closed,
    /// Session failed; the negotiator stays in `Failed` until reset
    Failed(String),
}

/// Negotiation state machine over a [`PeerConnector`]
pub struct Negotiator<C: PeerConnector> {
    connector: C,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    local_id: Option<ClientId>,
    registry: ClientRegistry,
    state: NegotiationState,
    role: Option<Role>,
    remote_id: Option<ClientId>,
    session: Option<C::Session>,
    events: Option<mpsc::UnboundedReceiver<PeerEvent<C::Channel>>>,
    pending_candidates: Vec<(ClientId, IceCandidate)>,
    remote_description_set: bool,
    channel: Option<Arc<C::Channel>>,
}

impl<C: PeerConnector> Negotiator<C> {
    /// Create a negotiator; relay frames it produces are pushed to `outbound`
    pub fn new(connector: C, outbound: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self {
            connector,
            outbound,
            local_id: None,
            registry: ClientRegistry::new(),
            state: NegotiationState::Idle,
            role: None,
            remote_id: None,
            session: None,
            events: None,
            pending_candidates: Vec::new(),
            remote_description_set: false,
            channel: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Identity the relay assigned to this client, once known
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Identities in the latest snapshot other than our own
    pub fn available_peers(&self) -> Vec<ClientId> {
        self.registry.others(self.local_id.as_deref())
    }

    /// The open data channel, only while `Connected`
    pub fn channel(&self) -> Option<Arc<C::Channel>> {
        match self.state {
            NegotiationState::Connected => self.channel.clone(),
            _ => None,
        }
    }

    /// Start a session with `target` as the initiator
    ///
    /// # Errors
    ///
    /// - [`Error::SessionBusy`] if a session already exists
    /// - [`Error::UnknownPeer`] if `target` is ourselves or not in the latest
    ///   registry snapshot
    /// - [`Error::Sdp`] / [`Error::PeerConnection`] if the substrate fails;
    ///   the negotiator is left in `Failed`
    pub async fn connect_to(&mut self, target: &str) -> Result<()> {
        if self.state != NegotiationState::Idle {
            return Err(Error::SessionBusy(format!(
                "cannot connect to {} while {:?}",
                target, self.state
            )));
        }
        if self.local_id.as_deref() == Some(target) || !self.registry.contains(target) {
            return Err(Error::UnknownPeer(target.to_string()));
        }

        info!(peer = target, "Connecting to peer");
        self.remote_id = Some(target.to_string());
        self.role = Some(Role::Initiator);
        self.pending_candidates.retain(|(sender, _)| sender == target);

        self.open_session(Role::Initiator).await?;

        let created = self.current_session()?.create_offer().await;
        let offer = match created {
            Ok(offer) => offer,
            Err(e) => return Err(self.fail_with(e).await),
        };
        self.state = NegotiationState::OfferCreated;

        self.send(ClientMessage::Offer {
            target: target.to_string(),
            offer,
        })?;
        self.state = NegotiationState::AwaitingAnswer;
        debug!(peer = target, "Offer sent, awaiting answer");

        Ok(())
    }

    /// Apply one frame from the relay
    ///
    /// Errors describe a message that was ignored; the session is untouched
    /// unless the state is reported as `Failed`.
    pub async fn handle_server_message(&mut self, message: ServerMessage) -> Result<SessionUpdate> {
        match message {
            ServerMessage::Connected { id } => {
                info!(id = %id, "Relay assigned identity");
                self.local_id = Some(id);
                Ok(SessionUpdate::PeersChanged)
            }
            ServerMessage::Clients(snapshot) => {
                self.registry = ClientRegistry::from_snapshot(snapshot);
                debug!(clients = self.registry.len(), "Client registry updated");

                let remote_gone = self
                    .remote_id
                    .as_deref()
                    .is_some_and(|id| !self.registry.contains(id));
                if self.state.is_negotiating() && remote_gone {
                    warn!(
                        remote = self.remote_id.as_deref().unwrap_or_default(),
                        "Peer left the relay during negotiation"
                    );
                    self.reset().await;
                    return Ok(SessionUpdate::Closed);
                }
                Ok(SessionUpdate::PeersChanged)
            }
            ServerMessage::Offer { sender, offer } => self.accept_offer(sender, offer).await,
            ServerMessage::Answer { sender, answer } => self.accept_answer(sender, answer).await,
            ServerMessage::IceCandidate { sender, candidate } => {
                self.accept_candidate(sender, candidate).await
            }
        }
    }

    /// Apply one event from the current session's substrate
    pub async fn handle_peer_event(&mut self, event: PeerEvent<C::Channel>) -> Result<SessionUpdate> {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let Some(target) = self.remote_id.clone() else {
                    debug!("Dropping local candidate with no remote peer");
                    return Ok(SessionUpdate::None);
                };
                self.send(ClientMessage::IceCandidate { target, candidate })?;
                Ok(SessionUpdate::None)
            }
            PeerEvent::ChannelOpen(channel) => {
                info!(channel = channel.label(), "Data channel open");
                self.channel = Some(channel);
                Ok(self.try_complete())
            }
            PeerEvent::ChannelMessage(message) => {
                if self.session.is_none() {
                    return Ok(SessionUpdate::None);
                }
                Ok(SessionUpdate::Message(message))
            }
            PeerEvent::ChannelClosed => {
                if self.session.is_none() {
                    return Ok(SessionUpdate::None);
                }
                info!(remote = self.remote_id.as_deref().unwrap_or_default(), "Data channel closed");
                self.reset().await;
                Ok(SessionUpdate::Closed)
            }
            PeerEvent::ConnectionFailed(reason) => {
                if self.session.is_none() {
                    return Ok(SessionUpdate::None);
                }
                warn!(reason = %reason, "Peer connection failed");
                self.close_session().await;
                self.state = NegotiationState::Failed;
                Ok(SessionUpdate::Failed(reason))
            }
        }
    }

    /// Next event from the current session; pending forever when there is none
    ///
    /// Cancel safe, so it can sit in a `select!` next to relay frames and
    /// user commands.
    pub async fn next_peer_event(&mut self) -> PeerEvent<C::Channel> {
        loop {
            let Some(events) = self.events.as_mut() else {
                return std::future::pending().await;
            };
            if let Some(event) = events.recv().await {
                return event;
            }
            self.events = None;
        }
    }

    /// Close any session and return to `Idle`
    ///
    /// Events still queued from the old session are discarded with it.
    pub async fn reset(&mut self) {
        self.close_session().await;
        self.state = NegotiationState::Idle;
        self.role = None;
        self.remote_id = None;
        self.pending_candidates.clear();
    }

    async fn accept_offer(&mut self, sender: ClientId, offer: SessionDescription) -> Result<SessionUpdate> {
        if self.state != NegotiationState::Idle {
            return Err(Error::SessionBusy(format!(
                "offer from {} while {:?}",
                sender, self.state
            )));
        }

        info!(sender = %sender, "Received offer");
        self.remote_id = Some(sender.clone());
        self.role = Some(Role::Responder);
        self.pending_candidates.retain(|(from, _)| *from == sender);

        self.open_session(Role::Responder).await?;
        self.state = NegotiationState::OfferReceived;

        let committed = self.current_session()?.set_remote_description(offer).await;
        if let Err(e) = committed {
            return Err(self.fail_with(e).await);
        }
        self.remote_description_set = true;
        self.flush_pending_candidates().await;

        let created = self.current_session()?.create_answer().await;
        let answer = match created {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail_with(e).await),
        };
        self.send(ClientMessage::Answer {
            target: sender,
            answer,
        })?;
        self.state = NegotiationState::AnswerCreated;
        debug!("Answer sent");

        Ok(self.try_complete())
    }

    async fn accept_answer(&mut self, sender: ClientId, answer: SessionDescription) -> Result<SessionUpdate> {
        if self.state != NegotiationState::AwaitingAnswer || self.remote_description_set {
            return Err(Error::UnexpectedSignal(format!(
                "answer from {} while {:?}",
                sender, self.state
            )));
        }
        if self.remote_id.as_deref() != Some(sender.as_str()) {
            return Err(Error::UnexpectedSignal(format!(
                "answer from {} but offer went to {}",
                sender,
                self.remote_id.as_deref().unwrap_or_default()
            )));
        }

        info!(sender = %sender, "Received answer");
        let committed = self.current_session()?.set_remote_description(answer).await;
        if let Err(e) = committed {
            return Err(self.fail_with(e).await);
        }
        self.remote_description_set = true;
        self.flush_pending_candidates().await;

        Ok(self.try_complete())
    }

    async fn accept_candidate(&mut self, sender: ClientId, candidate: IceCandidate) -> Result<SessionUpdate> {
        if let Some(remote) = self.remote_id.as_deref() {
            if remote != sender {
                return Err(Error::UnexpectedSignal(format!(
                    "candidate from {} during session with {}",
                    sender, remote
                )));
            }
        }

        if self.state == NegotiationState::Failed {
            return Err(Error::UnexpectedSignal(format!(
                "candidate from {} after session failure",
                sender
            )));
        }

        if self.session.is_none() || !self.remote_description_set {
            if self.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
                return Err(Error::IceCandidate(format!(
                    "pending candidate queue full, dropping candidate from {}",
                    sender
                )));
            }
            debug!(sender = %sender, "Queueing remote candidate until remote description is set");
            self.pending_candidates.push((sender, candidate));
            return Ok(SessionUpdate::None);
        }

        self.current_session()?.add_ice_candidate(candidate).await?;
        Ok(SessionUpdate::None)
    }

    /// Connected once the remote description is committed and the channel is open
    fn try_complete(&mut self) -> SessionUpdate {
        let ready = self.remote_description_set && self.channel.is_some();
        match self.state {
            NegotiationState::AwaitingAnswer | NegotiationState::AnswerCreated if ready => {
                self.state = NegotiationState::Connected;
                info!(
                    remote = self.remote_id.as_deref().unwrap_or_default(),
                    "Peer session connected"
                );
                SessionUpdate::Connected
            }
            _ => SessionUpdate::None,
        }
    }

    async fn open_session(&mut self, role: Role) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.connector.connect(role, tx).await {
            Ok(session) => {
                self.events = Some(rx);
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                self.state = NegotiationState::Failed;
                Err(e)
            }
        }
    }

    fn current_session(&self) -> Result<&C::Session> {
        self.session.as_ref().ok_or(Error::NoSession)
    }

    async fn flush_pending_candidates(&mut self) {
        let pending = std::mem::take(&mut self.pending_candidates);
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !pending.is_empty() {
            debug!(count = pending.len(), "Applying queued remote candidates");
        }
        for (_, candidate) in pending {
            if let Err(e) = session.add_ice_candidate(candidate).await {
                warn!("Failed to apply queued candidate: {}", e);
            }
        }
    }

    async fn fail_with(&mut self, error: Error) -> Error {
        warn!("Negotiation failed: {}", error);
        self.close_session().await;
        self.state = NegotiationState::Failed;
        error
    }

    async fn close_session(&mut self) {
        self.events = None;
        self.channel = None;
        self.remote_description_set = false;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Error closing peer session: {}", e);
            }
        }
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        debug!(event = message.event_name(), to = message.target(), "Relaying signal");
        self.outbound
            .send(message)
            .map_err(|_| Error::Signaling("relay connection closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientRecord;
    use crate::testing::{MemoryChannel, MockConnector, SessionCall};

    fn snapshot(ids: &[&str]) -> ServerMessage {
        ServerMessage::Clients(
            ids.iter()
                .map(|id| (id.to_string(), ClientRecord { id: id.to_string() }))
                .collect(),
        )
    }

    async fn negotiator(
        own: &str,
        peers: &[&str],
    ) -> (
        Negotiator<MockConnector>,
        MockConnector,
        mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        let connector = MockConnector::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut negotiator = Negotiator::new(connector.clone(), tx);
        negotiator
            .handle_server_message(ServerMessage::Connected { id: own.to_string() })
            .await
            .unwrap();
        negotiator.handle_server_message(snapshot(peers)).await.unwrap();
        (negotiator, connector, rx)
    }

    #[tokio::test]
    async fn test_initiator_path() {
        let (mut neg, connector, mut relay) = negotiator("abc", &["abc", "xyz"]).await;
        assert_eq!(neg.available_peers(), vec!["xyz".to_string()]);

        neg.connect_to("xyz").await.unwrap();
        assert_eq!(neg.state(), NegotiationState::AwaitingAnswer);
        match relay.try_recv().unwrap() {
            ClientMessage::Offer { target, offer } => {
                assert_eq!(target, "xyz");
                assert_eq!(offer, SessionDescription::offer("mock-offer"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let update = neg
            .handle_server_message(ServerMessage::Answer {
                sender: "xyz".to_string(),
                answer: SessionDescription::answer("remote-answer"),
            })
            .await
            .unwrap();
        assert!(matches!(update, SessionUpdate::None));
        assert!(neg.channel().is_none());

        let update = neg
            .handle_peer_event(PeerEvent::ChannelOpen(Arc::new(MemoryChannel::open("fileTransfer"))))
            .await
            .unwrap();
        assert!(matches!(update, SessionUpdate::Connected));
        assert_eq!(neg.state(), NegotiationState::Connected);
        assert!(neg.channel().is_some());
        assert_eq!(
            connector.calls(),
            vec![
                SessionCall::Connect(Role::Initiator),
                SessionCall::CreateOffer,
                SessionCall::SetRemote(SessionDescription::answer("remote-answer")),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_open_before_answer_waits_for_answer() {
        let (mut neg, _connector, _relay) = negotiator("abc", &["abc", "xyz"]).await;
        neg.connect_to("xyz").await.unwrap();

        let update = neg
            .handle_peer_event(PeerEvent::ChannelOpen(Arc::new(MemoryChannel::open("fileTransfer"))))
            .await
            .unwrap();
        assert!(matches!(update, SessionUpdate::None));
        assert_eq!(neg.state(), NegotiationState::AwaitingAnswer);

        let update = neg
            .handle_server_message(ServerMessage::Answer {
                sender: "xyz".to_string(),
                answer: SessionDescription::answer("a"),
            })
            .await
            .unwrap();
        assert!(matches!(update, SessionUpdate::Connected));
    }

    #[tokio::test]
    async fn test_responder_queues_early_candidates() {
        let (mut neg, connector, mut relay) = negotiator("xyz", &["abc", "xyz"]).await;

        // Candidate overtakes the offer
        neg.handle_server_message(ServerMessage::IceCandidate {
            sender: "abc".to_string(),
            candidate: IceCandidate::new("candidate:1"),
        })
        .await
        .unwrap();
        assert!(connector.calls().is_empty());

        neg.handle_server_message(ServerMessage::Offer {
            sender: "abc".to_string(),
            offer: SessionDescription::offer("remote-offer"),
        })
        .await
        .unwrap();
        assert_eq!(neg.state(), NegotiationState::AnswerCreated);

        neg.handle_server_message(ServerMessage::IceCandidate {
            sender: "abc".to_string(),
            candidate: IceCandidate::new("candidate:2"),
        })
        .await
        .unwrap();

        assert_eq!(
            connector.calls(),
            vec![
                SessionCall::Connect(Role::Responder),
                SessionCall::SetRemote(SessionDescription::offer("remote-offer")),
                SessionCall::AddCandidate(IceCandidate::new("candidate:1")),
                SessionCall::CreateAnswer,
                SessionCall::AddCandidate(IceCandidate::new("candidate:2")),
            ]
        );
        assert!(matches!(
            relay.try_recv().unwrap(),
            ClientMessage::Answer { ref target, .. } if target == "abc"
        ));
    }

    #[tokio::test]
    async fn test_local_candidates_relayed_individually() {
        let (mut neg, _connector, mut relay) = negotiator("abc", &["abc", "xyz"]).await;
        neg.connect_to("xyz").await.unwrap();
        let _offer = relay.try_recv().unwrap();

        for c in ["candidate:a", "candidate:b"] {
            neg.handle_peer_event(PeerEvent::LocalCandidate(IceCandidate::new(c)))
                .await
                .unwrap();
        }

        for c in ["candidate:a", "candidate:b"] {
            assert_eq!(
                relay.try_recv().unwrap(),
                ClientMessage::IceCandidate {
                    target: "xyz".to_string(),
                    candidate: IceCandidate::new(c),
                }
            );
        }
    }

    #[tokio::test]
    async fn test_second_offer_rejected_when_busy() {
        let (mut neg, _connector, _relay) = negotiator("xyz", &["abc", "def", "xyz"]).await;
        neg.handle_server_message(ServerMessage::Offer {
            sender: "abc".to_string(),
            offer: SessionDescription::offer("o1"),
        })
        .await
        .unwrap();
        neg.handle_peer_event(PeerEvent::ChannelOpen(Arc::new(MemoryChannel::open("fileTransfer"))))
            .await
            .unwrap();
        assert_eq!(neg.state(), NegotiationState::Connected);

        let err = neg
            .handle_server_message(ServerMessage::Offer {
                sender: "def".to_string(),
                offer: SessionDescription::offer("o2"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionBusy(_)));
        assert_eq!(neg.state(), NegotiationState::Connected);
        assert_eq!(neg.remote_id(), Some("abc"));
    }

    #[tokio::test]
    async fn test_unexpected_answer_ignored() {
        let (mut neg, connector, _relay) = negotiator("abc", &["abc", "xyz"]).await;
        let err = neg
            .handle_server_message(ServerMessage::Answer {
                sender: "xyz".to_string(),
                answer: SessionDescription::answer("a"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedSignal(_)));
        assert_eq!(neg.state(), NegotiationState::Idle);
        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_unknown_or_self() {
        let (mut neg, _connector, _relay) = negotiator("abc", &["abc", "xyz"]).await;
        assert!(matches!(neg.connect_to("abc").await, Err(Error::UnknownPeer(_))));
        assert!(matches!(neg.connect_to("nobody").await, Err(Error::UnknownPeer(_))));
        assert_eq!(neg.state(), NegotiationState::Idle);
    }

    #[tokio::test]
    async fn test_failed_remote_description_moves_to_failed() {
        let (mut neg, connector, _relay) = negotiator("xyz", &["abc", "xyz"]).await;
        connector.fail_remote_description(true);

        let err = neg
            .handle_server_message(ServerMessage::Offer {
                sender: "abc".to_string(),
                offer: SessionDescription::offer("bad"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sdp(_)));
        assert_eq!(neg.state(), NegotiationState::Failed);
        assert!(connector.calls().contains(&SessionCall::Close));

        neg.reset().await;
        assert_eq!(neg.state(), NegotiationState::Idle);
    }

    #[tokio::test]
    async fn test_channel_close_resets_and_drops_stale_events() {
        let (mut neg, connector, _relay) = negotiator("abc", &["abc", "xyz"]).await;
        neg.connect_to("xyz").await.unwrap();

        let events = connector.last_events().unwrap();
        events
            .send(PeerEvent::LocalCandidate(IceCandidate::new("stale")))
            .unwrap();

        let update = neg.handle_peer_event(PeerEvent::ChannelClosed).await.unwrap();
        assert!(matches!(update, SessionUpdate::Closed));
        assert_eq!(neg.state(), NegotiationState::Idle);
        assert!(events.is_closed());

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            neg.next_peer_event(),
        )
        .await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_peer_leaving_during_negotiation_resets() {
        let (mut neg, _connector, _relay) = negotiator("abc", &["abc", "xyz"]).await;
        neg.connect_to("xyz").await.unwrap();

        let update = neg.handle_server_message(snapshot(&["abc"])).await.unwrap();
        assert!(matches!(update, SessionUpdate::Closed));
        assert_eq!(neg.state(), NegotiationState::Idle);
        assert!(neg.available_peers().is_empty());
    }
}
