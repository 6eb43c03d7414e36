//! Per-connection WebSocket handling

use crate::hub::Hub;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use peerdrop_core::ClientMessage;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Message, Result as WsResult},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

type WsSink = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

/// Serve one relay connection until it closes or the server shuts down
pub async fn handle_connection(
    stream: TcpStream,
    hub: Arc<Hub>,
    mut shutdown: broadcast::Receiver<()>,
) -> WsResult<()> {
    let addr = stream.peer_addr()?;
    let ws_stream = accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();
    let ws_tx: WsSink = Arc::new(Mutex::new(ws_tx));

    // Frames queued by the hub for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let forward_tx = Arc::clone(&ws_tx);
    let forward_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = forward_tx.lock().await.send(Message::Text(text)).await {
                error!("Failed to send WebSocket message: {}", e);
                return;
            }
        }
        let _ = forward_tx.lock().await.close().await;
    });

    let client_id = hub.join(tx);
    info!(client = %client_id, %addr, "Relay connection established");

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = shutdown.recv() => {
                debug!(client = %client_id, "Closing connection for shutdown");
                break;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                Ok(message) => {
                    hub.route(&client_id, message);
                }
                Err(e) => warn!(client = %client_id, "Ignoring malformed frame: {}", e),
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = ws_tx.lock().await.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                info!(client = %client_id, "Connection closed by client");
                break;
            }
            Some(Ok(Message::Binary(_))) => {
                debug!(client = %client_id, "Ignoring binary frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(client = %client_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Dropping the hub's sender ends the forward task once its queue drains
    hub.leave(&client_id);
    let _ = forward_task.await;

    Ok(())
}
