//! Peer persistence trait and implementations (memory, file).

mod file;
mod memory;

use auto_impl::auto_impl;
use thiserror::Error;
use wayfare_primitives::{PeerIdentity, TunnelKey};

pub use file::FilePeerStore;
pub use memory::MemoryPeerStore;

#[derive(Debug, Error)]
pub enum PeerStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Peer persistence, keyed by tunnel public key.
///
/// Records never carry a private key. A wallet may have several records
/// over time (one per identity), at most one of them live.
#[auto_impl(&, Box, Arc)]
pub trait PeerStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<PeerIdentity>, PeerStoreError>;

    fn save(&self, peer: &PeerIdentity) -> Result<(), PeerStoreError>;

    fn save_batch(&self, peers: &[PeerIdentity]) -> Result<(), PeerStoreError> {
        for peer in peers {
            self.save(peer)?;
        }
        Ok(())
    }

    fn remove(&self, key: &TunnelKey) -> Result<(), PeerStoreError>;

    fn get(&self, key: &TunnelKey) -> Result<Option<PeerIdentity>, PeerStoreError>;

    fn contains(&self, key: &TunnelKey) -> Result<bool, PeerStoreError> {
        Ok(self.get(key)?.is_some())
    }

    fn count(&self) -> Result<usize, PeerStoreError>;

    /// Make every prior write durable.
    fn flush(&self) -> Result<(), PeerStoreError> {
        Ok(())
    }
}
