//! WebSocket connection to the relay
//!
//! Frames are JSON text messages in the `{event, data}` envelope. A sender
//! task writes queued [`ClientMessage`]s; a receiver task parses inbound
//! frames into [`ServerMessage`]s. The inbound queue ends when the socket
//! closes.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use peerdrop_core::{ClientMessage, Error, Result, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Both directions of a relay connection
pub struct RelayLink {
    /// Frames to send to the relay
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    /// Frames received from the relay
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

/// Connect to the relay at `url`
pub async fn connect_relay(url: &str) -> Result<RelayLink> {
    info!("Connecting to relay: {}", url);

    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| Error::Signaling(format!("Failed to connect to {}: {}", url, e)))?;

    info!("Connected to relay");

    let (write, read) = ws_stream.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    tokio::spawn(sender_task(write, outbound_rx));
    tokio::spawn(receiver_task(read, inbound_tx));

    Ok(RelayLink {
        outbound: outbound_tx,
        inbound: inbound_rx,
    })
}

async fn sender_task(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<ClientMessage>,
) {
    while let Some(message) = rx.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", message.event_name(), e);
                continue;
            }
        };

        if let Err(e) = write.send(Message::Text(text)).await {
            error!("Failed to send relay frame: {}", e);
            break;
        }
    }

    let _ = write.close().await;
    debug!("Relay sender task terminated");
}

async fn receiver_task(mut read: SplitStream<WsStream>, tx: mpsc::UnboundedSender<ServerMessage>) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match ServerMessage::from_json(&text) {
                Ok(message) => {
                    debug!(event = message.event_name(), "Relay frame received");
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring malformed relay frame: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("Relay connection closed");
                break;
            }
            Err(e) => {
                error!("Relay connection error: {}", e);
                break;
            }
            _ => {}
        }
    }

    debug!("Relay receiver task terminated");
}
