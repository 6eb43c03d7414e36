//! In-memory substrate doubles
//!
//! [`MemoryChannel`] records everything sent on it and lets a test steer its
//! open state and buffered amount. [`MockConnector`] hands out sessions that
//! record every call made on them.

use crate::peer::{PeerConnector, PeerEventSender, PeerSession, Role};
use crate::protocol::{IceCandidate, SessionDescription};
use crate::transfer::{ChannelMessage, TransferChannel};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// A message captured by [`MemoryChannel`]
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: ChannelMessage,
    pub at: Instant,
}

/// Data channel double with a controllable buffer
#[derive(Debug)]
pub struct MemoryChannel {
    label: String,
    open: AtomicBool,
    buffered: AtomicUsize,
    drain_per_poll: AtomicUsize,
    sent: Mutex<Vec<SentMessage>>,
}

impl MemoryChannel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            open: AtomicBool::new(false),
            buffered: AtomicUsize::new(0),
            drain_per_poll: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A channel that is already open
    pub fn open(label: impl Into<String>) -> Self {
        let channel = Self::new(label);
        channel.set_open(true);
        channel
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn set_buffered(&self, bytes: usize) {
        self.buffered.store(bytes, Ordering::SeqCst);
    }

    /// Bytes the buffer drains each time its amount is polled
    pub fn set_drain_per_poll(&self, bytes: usize) {
        self.drain_per_poll.store(bytes, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Messages sent so far, in order, clearing the record
    pub fn take_messages(&self) -> Vec<ChannelMessage> {
        self.sent.lock().drain(..).map(|s| s.message).collect()
    }

    fn record(&self, message: ChannelMessage) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed(self.label.clone()));
        }
        self.sent.lock().push(SentMessage {
            message,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl TransferChannel for MemoryChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn buffered_amount(&self) -> usize {
        let drain = self.drain_per_poll.load(Ordering::SeqCst);
        let current = self.buffered.load(Ordering::SeqCst);
        self.buffered
            .store(current.saturating_sub(drain), Ordering::SeqCst);
        current
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.record(ChannelMessage::Text(text))
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        self.record(ChannelMessage::Binary(data))
    }
}

/// A call made on a [`MockSession`] (or the connector)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Connect(Role),
    CreateOffer,
    CreateAnswer,
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
    Close,
}

#[derive(Default)]
struct MockShared {
    calls: Mutex<Vec<SessionCall>>,
    events: Mutex<Option<PeerEventSender<MemoryChannel>>>,
    fail_remote_description: AtomicBool,
}

/// Connector whose sessions only record what they are asked to do
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<MockShared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, across sessions, in order
    pub fn calls(&self) -> Vec<SessionCall> {
        self.shared.calls.lock().clone()
    }

    /// Event sender handed to the most recent session
    pub fn last_events(&self) -> Option<PeerEventSender<MemoryChannel>> {
        self.shared.events.lock().clone()
    }

    /// Make `set_remote_description` fail with an SDP error
    pub fn fail_remote_description(&self, fail: bool) {
        self.shared
            .fail_remote_description
            .store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    type Session = MockSession;
    type Channel = MemoryChannel;

    async fn connect(
        &self,
        role: Role,
        events: PeerEventSender<MemoryChannel>,
    ) -> Result<MockSession> {
        self.shared.calls.lock().push(SessionCall::Connect(role));
        *self.shared.events.lock() = Some(events);
        Ok(MockSession {
            shared: self.shared.clone(),
        })
    }
}

/// Session created by [`MockConnector`]
pub struct MockSession {
    shared: Arc<MockShared>,
}

impl MockSession {
    fn record(&self, call: SessionCall) {
        self.shared.calls.lock().push(call);
    }
}

#[async_trait]
impl PeerSession for MockSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(SessionCall::CreateOffer);
        Ok(SessionDescription::offer("mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(SessionCall::CreateAnswer);
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.shared.fail_remote_description.load(Ordering::SeqCst) {
            return Err(Error::Sdp("rejected remote description".to_string()));
        }
        self.record(SessionCall::SetRemote(description));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(SessionCall::AddCandidate(candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(SessionCall::Close);
        Ok(())
    }
}
