//! Relay WebSocket server
//!
//! Binds a TCP listener and serves every accepted connection on its own
//! task against a shared [`Hub`].

use crate::handler::handle_connection;
use crate::hub::Hub;
use peerdrop_core::{RelayConfig, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Relay server entry points
pub struct RelayServer;

impl RelayServer {
    /// Bind the listener and start accepting connections in the background
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the address cannot be bound.
    pub async fn bind(config: RelayConfig) -> Result<RelayServerHandle> {
        Self::bind_with_hub(config, Arc::new(Hub::new())).await
    }

    /// Like [`RelayServer::bind`], serving an existing hub
    pub async fn bind_with_hub(config: RelayConfig, hub: Arc<Hub>) -> Result<RelayServerHandle> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Relay listening on ws://{}", local_addr);

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&hub),
            shutdown_tx.clone(),
        ));

        Ok(RelayServerHandle {
            local_addr,
            hub,
            shutdown_tx,
            accept_task,
        })
    }
}

async fn accept_loop(listener: TcpListener, hub: Arc<Hub>, shutdown_tx: broadcast::Sender<()>) {
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer_addr)) => {
                    let hub = Arc::clone(&hub);
                    let shutdown = shutdown_tx.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, hub, shutdown).await {
                            error!("Relay connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            _ = shutdown_rx.recv() => {
                info!("Relay received shutdown signal");
                break;
            }
        }
    }

    info!("Relay accept loop exited");
}

/// Handle for a running relay
pub struct RelayServerHandle {
    local_addr: SocketAddr,
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl RelayServerHandle {
    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    /// Stop accepting and close every open connection
    pub async fn shutdown(self) {
        info!("Shutting down relay");
        let _ = self.shutdown_tx.send(());
        let _ = self.accept_task.await;
    }
}
