//! webrtc-rs data channel as a transfer channel

use peerdrop_core::transfer::{ChannelMessage, TransferChannel};
use peerdrop_core::{Error, PeerEvent, PeerEventSender, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// Open data channel handed to the transfer engine
pub struct RtcDataChannel {
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
}

impl RtcDataChannel {
    pub fn new(rtc_channel: Arc<RTCDataChannel>) -> Self {
        Self {
            label: rtc_channel.label().to_string(),
            rtc_channel,
        }
    }
}

#[async_trait]
impl TransferChannel for RtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn is_open(&self) -> bool {
        self.rtc_channel.ready_state() == RTCDataChannelState::Open
    }

    async fn buffered_amount(&self) -> usize {
        self.rtc_channel.buffered_amount().await
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.rtc_channel
            .send_text(text)
            .await
            .map_err(|e| Error::ChannelClosed(format!("{}: failed to send text: {}", self.label, e)))?;
        Ok(())
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        self.rtc_channel
            .send(&data)
            .await
            .map_err(|e| Error::ChannelClosed(format!("{}: failed to send binary: {}", self.label, e)))?;
        Ok(())
    }
}

/// Route a data channel's lifecycle and messages into the session's events
///
/// Handlers only enqueue, so messages keep their arrival order.
pub(crate) fn forward_channel_events(
    rtc_channel: &Arc<RTCDataChannel>,
    events: PeerEventSender<RtcDataChannel>,
) {
    let label = rtc_channel.label().to_string();

    let opened = Arc::clone(rtc_channel);
    let open_events = events.clone();
    rtc_channel.on_open(Box::new(move || {
        debug!("Data channel '{}' opened", opened.label());
        let channel = RtcDataChannel::new(Arc::clone(&opened));
        let _ = open_events.send(PeerEvent::ChannelOpen(Arc::new(channel)));
        Box::pin(async {})
    }));

    let message_events = events.clone();
    rtc_channel.on_message(Box::new(move |msg: DataChannelMessage| {
        let message = if msg.is_string {
            ChannelMessage::Text(String::from_utf8_lossy(&msg.data).into_owned())
        } else {
            ChannelMessage::Binary(msg.data)
        };
        let _ = message_events.send(PeerEvent::ChannelMessage(message));
        Box::pin(async {})
    }));

    let close_label = label.clone();
    rtc_channel.on_close(Box::new(move || {
        info!("Data channel '{}' closed", close_label);
        let _ = events.send(PeerEvent::ChannelClosed);
        Box::pin(async {})
    }));

    rtc_channel.on_error(Box::new(move |err| {
        let label = label.clone();
        Box::pin(async move {
            error!("Data channel '{}' error: {}", label, err);
        })
    }));
}
