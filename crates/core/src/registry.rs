//! Connected-client registry
//!
//! The relay owns the authoritative registry; clients hold the latest
//! snapshot they were sent. Keys are always currently-connected identities.

use crate::protocol::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-client record broadcast to every connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
}

/// Wire form of the registry: identity -> record
pub type ClientSnapshot = BTreeMap<ClientId, ClientRecord>;

/// Mapping of connected identities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRegistry {
    clients: ClientSnapshot,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a received snapshot
    pub fn from_snapshot(snapshot: ClientSnapshot) -> Self {
        Self { clients: snapshot }
    }

    /// Insert an identity; returns false if it was already present
    pub fn insert(&mut self, id: ClientId) -> bool {
        if self.clients.contains_key(&id) {
            return false;
        }
        self.clients.insert(id.clone(), ClientRecord { id });
        true
    }

    /// Remove an identity; returns false if it was not present
    pub fn remove(&mut self, id: &str) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ClientId> {
        self.clients.keys()
    }

    /// Identities other than `own_id`, in stable order
    pub fn others(&self, own_id: Option<&str>) -> Vec<ClientId> {
        self.clients
            .keys()
            .filter(|id| Some(id.as_str()) != own_id)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        self.clients.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut registry = ClientRegistry::new();
        assert!(registry.insert("abc".to_string()));
        assert!(!registry.insert("abc".to_string()));
        assert!(registry.insert("xyz".to_string()));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("abc"));
        assert!(!registry.remove("abc"));
        assert!(!registry.contains("abc"));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["xyz"]);
    }

    #[test]
    fn test_others_excludes_self() {
        let mut registry = ClientRegistry::new();
        registry.insert("abc".to_string());
        registry.insert("xyz".to_string());
        registry.insert("def".to_string());

        assert_eq!(registry.others(Some("def")), vec!["abc", "xyz"]);
        assert_eq!(registry.others(None).len(), 3);
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_membership() {
        let mut registry = ClientRegistry::new();
        registry.insert("xyz".to_string());
        registry.insert("abc".to_string());

        let rebuilt = ClientRegistry::from_snapshot(registry.snapshot());
        assert_eq!(rebuilt, registry);
        assert_eq!(rebuilt.snapshot()["abc"].id, "abc");
    }
}
