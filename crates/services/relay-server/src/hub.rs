//! Connected clients and signaling forwarding
//!
//! The hub owns the [`ClientRegistry`] together with every connection's
//! outbound queue behind one lock. Membership changes and the `clients`
//! broadcast that announces them happen under a single acquisition, so every
//! connection sees snapshots in the order the changes were made.

use parking_lot::Mutex;
use peerdrop_core::{ClientId, ClientMessage, ClientRegistry, ClientSnapshot, ServerMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Outbound queue of one connection, carrying serialized frames
pub type FrameSender = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct HubState {
    registry: ClientRegistry,
    connections: HashMap<ClientId, FrameSender>,
}

impl HubState {
    fn broadcast(&self, message: &ServerMessage) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", message.event_name(), e);
                return;
            }
        };

        for tx in self.connections.values() {
            // A closed queue belongs to a connection that is about to leave
            let _ = tx.send(text.clone());
        }
    }

    fn broadcast_registry(&self) {
        self.broadcast(&ServerMessage::Clients(self.registry.snapshot()));
    }
}

/// Relay state shared by every connection task
#[derive(Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection under a fresh identity
    ///
    /// The connection is sent its `connected` frame first, then every
    /// connection (itself included) is sent the updated registry.
    pub fn join(&self, tx: FrameSender) -> ClientId {
        let mut state = self.state.lock();

        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string();
            if !state.registry.contains(&candidate) {
                break candidate;
            }
        };

        Self::admit(&mut state, id.clone(), tx);
        id
    }

    /// Register a connection under a caller-chosen identity
    ///
    /// Returns false, leaving the registry untouched, if `id` is taken.
    #[cfg(test)]
    fn join_as(&self, id: impl Into<ClientId>, tx: FrameSender) -> bool {
        let id = id.into();
        let mut state = self.state.lock();
        if state.registry.contains(&id) {
            return false;
        }

        Self::admit(&mut state, id, tx);
        true
    }

    fn admit(state: &mut HubState, id: ClientId, tx: FrameSender) {
        match (ServerMessage::Connected { id: id.clone() }).to_json() {
            Ok(text) => {
                let _ = tx.send(text);
            }
            Err(e) => error!("Failed to serialize connected frame: {}", e),
        }

        state.registry.insert(id.clone());
        state.connections.insert(id.clone(), tx);
        info!(client = %id, clients = state.registry.len(), "Client joined");

        state.broadcast_registry();
    }

    /// Remove a connection and announce the new membership
    ///
    /// Returns false if `id` was not registered.
    pub fn leave(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if !state.registry.remove(id) {
            return false;
        }
        state.connections.remove(id);
        info!(client = %id, clients = state.registry.len(), "Client left");

        state.broadcast_registry();
        true
    }

    /// Forward a signaling frame to its target, tagged with the true sender
    ///
    /// Frames for identities that are not connected, or addressed to the
    /// sender itself, are dropped. Returns whether the frame was queued for
    /// delivery.
    pub fn route(&self, sender: &str, message: ClientMessage) -> bool {
        if message.target() == sender {
            debug!(
                from = %sender,
                event = message.event_name(),
                "Dropping frame addressed to its sender"
            );
            return false;
        }

        let state = self.state.lock();

        let Some(tx) = state.connections.get(message.target()) else {
            debug!(
                from = %sender,
                to = %message.target(),
                event = message.event_name(),
                "Dropping frame for unknown target"
            );
            return false;
        };

        let target = message.target().to_string();
        let forwarded = message.into_forwarded(sender.to_string());
        let text = match forwarded.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", forwarded.event_name(), e);
                return false;
            }
        };

        debug!(from = %sender, to = %target, event = forwarded.event_name(), "Forwarding frame");
        tx.send(text).is_ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().registry.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().registry.is_empty()
    }

    /// Current registry, as broadcast to clients
    pub fn snapshot(&self) -> ClientSnapshot {
        self.state.lock().registry.snapshot()
    }
}
