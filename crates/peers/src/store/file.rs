//! JSON file-based peer store with atomic writes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::warn;
use wayfare_primitives::{PeerIdentity, TunnelKey};

use super::{PeerStore, PeerStoreError};

/// JSON file store. Loaded to memory on startup, written back on flush.
#[derive(Debug)]
pub struct FilePeerStore {
    path: PathBuf,
    peers: RwLock<HashMap<TunnelKey, PeerIdentity>>,
    dirty: Mutex<bool>,
}

impl FilePeerStore {
    /// Load existing file or create empty store.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PeerStoreError> {
        let path = path.into();
        let peers = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            peers: RwLock::new(peers),
            dirty: Mutex::new(false),
        })
    }

    /// Create store, making parent directories if needed.
    pub fn new_with_create_dir(path: impl Into<PathBuf>) -> Result<Self, PeerStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::new(path)
    }

    fn load_from_file(path: &Path) -> Result<HashMap<TunnelKey, PeerIdentity>, PeerStoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let records: Vec<PeerIdentity> = serde_json::from_reader(reader)
            .map_err(|e| PeerStoreError::Serialization(e.to_string()))?;

        Ok(records
            .into_iter()
            .map(|peer| (peer.public_key, peer))
            .collect())
    }

    fn save_to_file(&self) -> Result<(), PeerStoreError> {
        let mut records: Vec<PeerIdentity> = self.peers.read().values().cloned().collect();
        records.sort_by(|a, b| (a.created_at, a.public_key).cmp(&(b.created_at, b.public_key)));

        // Write to temp file first, then rename (atomic)
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &records)
                .map_err(|e| PeerStoreError::Serialization(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn mark_dirty(&self) {
        *self.dirty.lock() = true;
    }

    pub fn is_dirty(&self) -> bool {
        *self.dirty.lock()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PeerStore for FilePeerStore {
    fn load_all(&self) -> Result<Vec<PeerIdentity>, PeerStoreError> {
        Ok(self.peers.read().values().cloned().collect())
    }

    fn save(&self, peer: &PeerIdentity) -> Result<(), PeerStoreError> {
        self.peers.write().insert(peer.public_key, peer.clone());
        self.mark_dirty();
        Ok(())
    }

    fn save_batch(&self, peers: &[PeerIdentity]) -> Result<(), PeerStoreError> {
        let mut store = self.peers.write();
        for peer in peers {
            store.insert(peer.public_key, peer.clone());
        }
        drop(store);
        self.mark_dirty();
        Ok(())
    }

    fn remove(&self, key: &TunnelKey) -> Result<(), PeerStoreError> {
        if self.peers.write().remove(key).is_some() {
            self.mark_dirty();
        }
        Ok(())
    }

    fn get(&self, key: &TunnelKey) -> Result<Option<PeerIdentity>, PeerStoreError> {
        Ok(self.peers.read().get(key).cloned())
    }

    fn count(&self) -> Result<usize, PeerStoreError> {
        Ok(self.peers.read().len())
    }

    fn flush(&self) -> Result<(), PeerStoreError> {
        let mut dirty = self.dirty.lock();
        if *dirty {
            self.save_to_file()?;
            *dirty = false;
        }
        Ok(())
    }
}

impl Drop for FilePeerStore {
    fn drop(&mut self) {
        if self.is_dirty()
            && let Err(error) = self.save_to_file()
        {
            warn!(path = %self.path.display(), %error, "Failed to write peer store on drop");
        }
    }
}
