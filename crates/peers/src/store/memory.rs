//! In-memory peer store (does not persist across restarts).

use std::collections::HashMap;

use parking_lot::RwLock;
use wayfare_primitives::{PeerIdentity, TunnelKey};

use super::{PeerStore, PeerStoreError};

/// In-memory peer store for testing and `--peers.ephemeral` nodes.
#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    peers: RwLock<HashMap<TunnelKey, PeerIdentity>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerStore for MemoryPeerStore {
    fn load_all(&self) -> Result<Vec<PeerIdentity>, PeerStoreError> {
        Ok(self.peers.read().values().cloned().collect())
    }

    fn save(&self, peer: &PeerIdentity) -> Result<(), PeerStoreError> {
        self.peers.write().insert(peer.public_key, peer.clone());
        Ok(())
    }

    fn remove(&self, key: &TunnelKey) -> Result<(), PeerStoreError> {
        self.peers.write().remove(key);
        Ok(())
    }

    fn get(&self, key: &TunnelKey) -> Result<Option<PeerIdentity>, PeerStoreError> {
        Ok(self.peers.read().get(key).cloned())
    }

    fn count(&self) -> Result<usize, PeerStoreError> {
        Ok(self.peers.read().len())
    }
}
