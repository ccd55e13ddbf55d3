//! Authoritative peer set, kept consistent with the live tunnel interface.
//!
//! Every mutation (register, remove, restore, revoke) is serialized by one
//! async mutex held across address allocation and the interface command.
//! The peer map has its own short-lived lock, so readers never wait on a
//! `wg` invocation and never observe a half-built identity.
//!
//! Records are written to the [`PeerStore`] while the map lock is held, so
//! the store never goes backwards relative to memory.
//!
//! Register and remove run on their own task. A caller that goes away
//! mid-mutation (a dropped HTTP request) leaves the mutation to finish.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wayfare_primitives::{PeerIdentity, PeerStatus, TunnelKey, WalletAddress, unix_timestamp};
use wayfare_tunnel::{KeyProvisioner, TunnelController, TunnelSecret};

use crate::{AddressAllocator, PeerStore, RegistryError};

/// Outcome of [`PeerRegistry::register_peer`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub peer: PeerIdentity,
    /// Private key for the client. Present only when the identity was just
    /// created; a repeated registration returns the existing identity without it.
    pub secret: Option<TunnelSecret>,
}

impl Registration {
    /// Whether this call created the identity.
    pub fn is_new(&self) -> bool {
        self.secret.is_some()
    }
}

/// Latest counter reading for a peer, produced by the usage meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub wallet: WalletAddress,
    /// Key the reading was taken for. Readings for a replaced identity are ignored.
    pub public_key: TunnelKey,
    /// New baseline (rx + tx).
    pub total: u64,
    /// Set when the reading showed new traffic.
    pub seen_at: Option<u64>,
}

/// Counts from [`PeerRegistry::restore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub active: usize,
    /// Live records that could not be re-applied and were kept pending.
    pub pending: usize,
    pub revoked: usize,
    pub rolled_back: usize,
}

/// Peer registry.
pub struct PeerRegistry {
    peers: RwLock<BTreeMap<WalletAddress, PeerIdentity>>,
    mutation: Mutex<()>,
    closing: AtomicBool,
    allocator: AddressAllocator,
    keys: KeyProvisioner,
    tunnel: Arc<dyn TunnelController>,
    store: Arc<dyn PeerStore>,
}

impl PeerRegistry {
    pub fn new(
        allocator: AddressAllocator,
        tunnel: Arc<dyn TunnelController>,
        store: Arc<dyn PeerStore>,
    ) -> Self {
        Self {
            peers: RwLock::new(BTreeMap::new()),
            mutation: Mutex::new(()),
            closing: AtomicBool::new(false),
            allocator,
            keys: KeyProvisioner::new(),
            tunnel,
            store,
        }
    }

    /// Replace the key provisioner.
    pub fn with_key_provisioner(mut self, keys: KeyProvisioner) -> Self {
        self.keys = keys;
        self
    }

    pub fn allocator(&self) -> &AddressAllocator {
        &self.allocator
    }

    /// Register a client, or return its existing live identity.
    pub async fn register_peer(
        self: &Arc<Self>,
        wallet: WalletAddress,
    ) -> Result<Registration, RegistryError> {
        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.register(wallet).await }).await?
    }

    /// Remove a client from the live interface, then mark it revoked.
    ///
    /// Removing a revoked peer is a no-op. If the interface refuses the
    /// removal the peer stays active.
    pub async fn remove_peer(
        self: &Arc<Self>,
        wallet: WalletAddress,
    ) -> Result<PeerIdentity, RegistryError> {
        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.remove(wallet).await }).await?
    }

    async fn register(&self, wallet: WalletAddress) -> Result<Registration, RegistryError> {
        if self.is_closing() {
            return Err(RegistryError::ShuttingDown);
        }
        let _guard = self.mutation.lock().await;
        if self.is_closing() {
            return Err(RegistryError::ShuttingDown);
        }

        let mut previous = self.peers.read().get(&wallet).cloned();
        if let Some(existing) = previous.as_ref().filter(|peer| peer.status.is_active()) {
            debug!(%wallet, address = %existing.virtual_address, "Peer already registered");
            return Ok(Registration {
                peer: existing.clone(),
                secret: None,
            });
        }
        if let Some(leftover) = previous.take_if(|peer| peer.status == PeerStatus::Pending)
            && let Some(peer) = self.reapply_pending(&leftover).await
        {
            return Ok(Registration { peer, secret: None });
        }

        let keypair = self.keys.generate_keypair()?;
        let used = self.used_hosts().await;
        let host = self.allocator.allocate(&used)?;
        let address = self.allocator.address_of(host);
        let pending = PeerIdentity::pending(wallet, keypair.public, address, unix_timestamp());

        let committed = self
            .commit(pending.clone())
            .and_then(|()| self.store.flush().map_err(RegistryError::from));
        if let Err(err) = committed {
            self.allocator.release(host);
            self.discard(&pending, previous.as_ref());
            return Err(err);
        }

        if let Err(err) = self.tunnel.apply_peer(&pending.public_key, address).await {
            warn!(%wallet, %address, %err, "Failed to apply peer, rolling back");
            self.allocator.release(host);
            self.discard(&pending, previous.as_ref());
            return Err(RegistryError::ApplyFailed(err));
        }

        let active = self.set_status(&wallet, PeerStatus::Active).unwrap_or(pending);
        if let Some(old) = previous.filter(|old| old.public_key != active.public_key)
            && let Err(err) = self.store.remove(&old.public_key)
        {
            warn!(%wallet, %err, "Failed to drop revoked record");
        }
        if let Err(err) = self.store.flush() {
            warn!(%wallet, %err, "Failed to persist active peer");
        }

        metrics::counter!("wayfare_peers_registered_total").increment(1);
        info!(%wallet, address = %active.virtual_address, peer = %active.public_key.short(), "Peer registered");

        Ok(Registration {
            peer: active,
            secret: Some(keypair.secret),
        })
    }

    async fn remove(&self, wallet: WalletAddress) -> Result<PeerIdentity, RegistryError> {
        let _guard = self.mutation.lock().await;

        let peer = self
            .peers
            .read()
            .get(&wallet)
            .cloned()
            .ok_or(RegistryError::NotFound(wallet))?;
        if peer.status.is_revoked() {
            debug!(%wallet, "Peer already revoked");
            return Ok(peer);
        }

        self.tunnel
            .remove_peer(&peer.public_key)
            .await
            .map_err(RegistryError::InterfaceError)?;

        let revoked = self.set_status(&wallet, PeerStatus::Revoked).unwrap_or(peer);
        if let Some(host) = self.allocator.host_of(revoked.virtual_address) {
            self.allocator.release(host);
        }
        if let Err(err) = self.store.flush() {
            warn!(%wallet, %err, "Failed to persist revoked peer");
        }

        metrics::counter!("wayfare_peers_removed_total").increment(1);
        info!(%wallet, address = %revoked.virtual_address, "Peer removed");
        Ok(revoked)
    }

    /// Every known peer, revoked ones included, ordered by wallet.
    pub fn snapshot(&self) -> Vec<PeerIdentity> {
        self.peers.read().values().cloned().collect()
    }

    /// Peers currently applied to the interface, ordered by wallet.
    pub fn active_peers(&self) -> Vec<PeerIdentity> {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.status.is_active())
            .cloned()
            .collect()
    }

    pub fn get(&self, wallet: &WalletAddress) -> Option<PeerIdentity> {
        self.peers.read().get(wallet).cloned()
    }

    /// Number of live (pending or active) peers.
    pub fn live_count(&self) -> usize {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.status.is_live())
            .count()
    }

    /// Move usage baselines forward.
    ///
    /// A reading is applied only if the peer is still active under the same
    /// key it was taken for. Returns how many readings were applied.
    pub fn record_observations(&self, observations: &[Observation]) -> Result<usize, RegistryError> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut applied = 0;
        {
            let mut peers = self.peers.write();
            for observation in observations {
                let Some(peer) = peers.get_mut(&observation.wallet) else {
                    continue;
                };
                if !peer.status.is_active() || peer.public_key != observation.public_key {
                    debug!(wallet = %observation.wallet, "Ignoring stale usage reading");
                    continue;
                }
                peer.cumulative_bytes = observation.total;
                if let Some(seen_at) = observation.seen_at {
                    peer.last_seen_at = Some(seen_at);
                }
                self.store.save(peer)?;
                applied += 1;
            }
        }

        self.store.flush()?;
        Ok(applied)
    }

    /// Rebuild the registry from the store and re-apply live peers.
    ///
    /// Pending records (a crash mid-registration) are applied or dropped.
    /// Active records that fail to apply are kept as pending and re-applied
    /// on the client's next registration.
    pub async fn restore(&self) -> Result<RestoreSummary, RegistryError> {
        let _guard = self.mutation.lock().await;

        let mut records = self.store.load_all()?;
        records.sort_by_key(|peer| (peer.created_at, peer.public_key));

        let mut summary = RestoreSummary::default();
        for record in records {
            let wallet = record.wallet;
            if record.status.is_revoked() {
                let mut peers = self.peers.write();
                if !peers.get(&wallet).is_some_and(|peer| peer.status.is_live()) {
                    peers.insert(wallet, record);
                }
                summary.revoked += 1;
                continue;
            }

            match self.tunnel.apply_peer(&record.public_key, record.virtual_address).await {
                Ok(()) => {
                    let mut active = record;
                    active.status = PeerStatus::Active;
                    self.commit(active)?;
                    summary.active += 1;
                }
                Err(err) if record.status == PeerStatus::Pending => {
                    warn!(%wallet, %err, "Dropping pending peer that could not be applied");
                    self.store.remove(&record.public_key)?;
                    summary.rolled_back += 1;
                }
                Err(err) => {
                    warn!(%wallet, %err, "Failed to re-apply active peer, keeping it pending");
                    let mut pending = record;
                    pending.status = PeerStatus::Pending;
                    self.commit(pending)?;
                    summary.pending += 1;
                }
            }
        }

        self.store.flush()?;
        info!(
            active = summary.active,
            pending = summary.pending,
            revoked = summary.revoked,
            rolled_back = summary.rolled_back,
            "Restored peers"
        );
        Ok(summary)
    }

    /// Stop accepting registrations and wait for in-flight mutations.
    ///
    /// Returns `false` if a mutation was still running after `timeout`.
    pub async fn close(&self, timeout: Duration) -> bool {
        self.closing.store(true, Ordering::SeqCst);
        match tokio::time::timeout(timeout, self.mutation.lock()).await {
            Ok(_guard) => true,
            Err(_) => {
                warn!(?timeout, "Peer mutation still in flight at shutdown");
                false
            }
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Mark every live peer revoked without touching the interface.
    ///
    /// Used at shutdown, right before the interface is torn down.
    pub async fn revoke_all(&self) -> Result<usize, RegistryError> {
        let _guard = self.mutation.lock().await;

        let mut revoked = 0;
        {
            let mut peers = self.peers.write();
            for peer in peers.values_mut().filter(|peer| peer.status.is_live()) {
                peer.status = PeerStatus::Revoked;
                self.store.save(peer)?;
                if let Some(host) = self.allocator.host_of(peer.virtual_address) {
                    self.allocator.release(host);
                }
                revoked += 1;
            }
        }

        self.store.flush()?;
        info!(revoked, "Revoked all peers");
        Ok(revoked)
    }

    /// Hosts held by live registry entries or routed on the live interface.
    async fn used_hosts(&self) -> BTreeSet<u8> {
        let mut used: BTreeSet<u8> = self
            .peers
            .read()
            .values()
            .filter(|peer| peer.status.is_live())
            .filter_map(|peer| self.allocator.host_of(peer.virtual_address))
            .collect();

        match self.tunnel.dump().await {
            Ok(dump) => used.extend(
                dump.addresses_in(self.allocator.subnet())
                    .filter_map(|address| self.allocator.host_of(address)),
            ),
            Err(err) if err.is_unavailable() => {
                debug!(%err, "Interface unavailable, allocating from registry state only");
            }
            Err(err) => warn!(%err, "Failed to read interface, allocating from registry state only"),
        }

        used
    }

    /// Apply a pending entry left by an earlier failure.
    ///
    /// Returns the now active identity, or `None` after dropping the entry
    /// because the interface still refuses it.
    async fn reapply_pending(&self, leftover: &PeerIdentity) -> Option<PeerIdentity> {
        let wallet = leftover.wallet;
        match self
            .tunnel
            .apply_peer(&leftover.public_key, leftover.virtual_address)
            .await
        {
            Ok(()) => {
                let active = self
                    .set_status(&wallet, PeerStatus::Active)
                    .unwrap_or_else(|| leftover.clone());
                if let Err(err) = self.store.flush() {
                    warn!(%wallet, %err, "Failed to persist active peer");
                }
                info!(%wallet, address = %active.virtual_address, "Re-applied pending peer");
                Some(active)
            }
            Err(err) => {
                warn!(%wallet, %err, "Dropping pending peer that could not be re-applied");
                if let Some(host) = self.allocator.host_of(leftover.virtual_address) {
                    self.allocator.release(host);
                }
                self.discard(leftover, None);
                None
            }
        }
    }

    /// Insert or replace an entry and persist it.
    fn commit(&self, peer: PeerIdentity) -> Result<(), RegistryError> {
        let mut peers = self.peers.write();
        self.store.save(&peer)?;
        peers.insert(peer.wallet, peer);
        Ok(())
    }

    fn set_status(&self, wallet: &WalletAddress, status: PeerStatus) -> Option<PeerIdentity> {
        let mut peers = self.peers.write();
        let peer = peers.get_mut(wallet)?;
        peer.status = status;
        if let Err(err) = self.store.save(peer) {
            warn!(%wallet, %status, %err, "Failed to persist peer status");
        }
        Some(peer.clone())
    }

    /// Undo a pending registration.
    fn discard(&self, pending: &PeerIdentity, previous: Option<&PeerIdentity>) {
        {
            let mut peers = self.peers.write();
            if let Err(err) = self.store.remove(&pending.public_key) {
                warn!(wallet = %pending.wallet, %err, "Failed to drop pending record");
            }
            match previous {
                Some(previous) => peers.insert(pending.wallet, previous.clone()),
                None => peers.remove(&pending.wallet),
            };
        }
        if let Err(err) = self.store.flush() {
            warn!(wallet = %pending.wallet, %err, "Failed to persist rollback");
        }
    }
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("peers", &self.peers.read().len())
            .field("closing", &self.is_closing())
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use assert_matches::assert_matches;
    use wayfare_tunnel::mock::{MockTunnel, TunnelCall};
    use wayfare_tunnel::{EntropySource, KeyError};

    use super::*;
    use crate::MemoryPeerStore;

    struct Harness {
        registry: Arc<PeerRegistry>,
        tunnel: Arc<MockTunnel>,
        store: Arc<MemoryPeerStore>,
    }

    fn harness() -> Harness {
        harness_with_keys(KeyProvisioner::new())
    }

    fn harness_with_keys(keys: KeyProvisioner) -> Harness {
        let tunnel = Arc::new(MockTunnel::new());
        let store = Arc::new(MemoryPeerStore::new());
        let allocator = AddressAllocator::new("10.0.0.0/24".parse().unwrap()).unwrap();
        let registry = Arc::new(
            PeerRegistry::new(allocator, tunnel.clone(), store.clone()).with_key_provisioner(keys),
        );
        Harness {
            registry,
            tunnel,
            store,
        }
    }

    fn wallet(n: u8) -> WalletAddress {
        WalletAddress::repeat_byte(n)
    }

    #[tokio::test]
    async fn test_register_applies_and_activates() {
        let h = harness();

        let registration = h.registry.register_peer(wallet(1)).await.unwrap();

        assert!(registration.is_new());
        let peer = &registration.peer;
        assert_eq!(peer.status, PeerStatus::Active);
        assert_eq!(peer.virtual_address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(
            registration.secret.as_ref().map(|s| s.public_key()),
            Some(peer.public_key)
        );
        assert!(h.tunnel.has_peer(&peer.public_key));
        assert_eq!(
            h.store.get(&peer.public_key).unwrap().map(|p| p.status),
            Some(PeerStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let h = harness();

        let first = h.registry.register_peer(wallet(1)).await.unwrap();
        let second = h.registry.register_peer(wallet(1)).await.unwrap();

        assert!(!second.is_new());
        assert_eq!(second.peer, first.peer);
        let applies = h
            .tunnel
            .calls()
            .into_iter()
            .filter(|call| matches!(call, TunnelCall::Apply(..)))
            .count();
        assert_eq!(applies, 1);
    }

    #[tokio::test]
    async fn test_apply_failure_rolls_back() {
        let h = harness();
        h.tunnel.fail_apply(true);

        let err = h.registry.register_peer(wallet(1)).await.unwrap_err();
        assert_matches!(err, RegistryError::ApplyFailed(_));
        assert!(h.registry.get(&wallet(1)).is_none());
        assert_eq!(h.store.count().unwrap(), 0);
        assert_eq!(h.registry.allocator().leased_count(), 0);

        h.tunnel.fail_apply(false);
        let peer = h.registry.register_peer(wallet(1)).await.unwrap().peer;
        assert_eq!(peer.virtual_address, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_finishes_when_caller_goes_away() {
        let h = harness();
        h.tunnel.set_apply_delay(Some(Duration::from_secs(2)));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), h.registry.register_peer(wallet(1))).await;
        assert!(abandoned.is_err());

        let retry = h.registry.register_peer(wallet(1)).await.unwrap();
        assert!(!retry.is_new());
        assert_eq!(retry.peer.status, PeerStatus::Active);
        assert!(h.tunnel.has_peer(&retry.peer.public_key));
        assert_eq!(
            h.store.get(&retry.peer.public_key).unwrap().map(|p| p.status),
            Some(PeerStatus::Active)
        );
        assert_eq!(h.registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_skips_addresses_on_live_interface() {
        let h = harness();
        h.tunnel
            .insert_live_peer(TunnelKey::from_bytes([7; 32]), Ipv4Addr::new(10, 0, 0, 2));

        let peer = h.registry.register_peer(wallet(1)).await.unwrap().peer;
        assert_eq!(peer.virtual_address, Ipv4Addr::new(10, 0, 0, 3));
    }

    #[tokio::test]
    async fn test_register_with_interface_down_uses_registry_state() {
        let h = harness();
        h.registry.register_peer(wallet(1)).await.unwrap();
        h.tunnel.set_up(false);

        let err = h.registry.register_peer(wallet(2)).await.unwrap_err();
        assert_matches!(err, RegistryError::ApplyFailed(ref e) if e.is_unavailable());
    }

    #[tokio::test]
    async fn test_remove_unknown_peer() {
        let h = harness();
        assert_matches!(
            h.registry.remove_peer(wallet(9)).await,
            Err(RegistryError::NotFound(w)) if w == wallet(9)
        );
    }

    #[tokio::test]
    async fn test_remove_revokes_and_releases() {
        let h = harness();
        let peer = h.registry.register_peer(wallet(1)).await.unwrap().peer;

        let removed = h.registry.remove_peer(wallet(1)).await.unwrap();
        assert_eq!(removed.status, PeerStatus::Revoked);
        assert!(!h.tunnel.has_peer(&peer.public_key));
        assert_eq!(h.registry.live_count(), 0);

        // Second remove is a no-op and never reaches the interface.
        let calls_before = h.tunnel.calls().len();
        let again = h.registry.remove_peer(wallet(1)).await.unwrap();
        assert_eq!(again.status, PeerStatus::Revoked);
        assert_eq!(h.tunnel.calls().len(), calls_before);

        let next = h.registry.register_peer(wallet(2)).await.unwrap().peer;
        assert_eq!(next.virtual_address, peer.virtual_address);
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_peer_active() {
        let h = harness();
        h.registry.register_peer(wallet(1)).await.unwrap();
        h.tunnel.fail_remove(true);

        let err = h.registry.remove_peer(wallet(1)).await.unwrap_err();
        assert_matches!(err, RegistryError::InterfaceError(_));
        assert_eq!(
            h.registry.get(&wallet(1)).map(|p| p.status),
            Some(PeerStatus::Active)
        );
    }

    #[tokio::test]
    async fn test_reregister_revoked_wallet() {
        let h = harness();
        let old = h.registry.register_peer(wallet(1)).await.unwrap().peer;
        h.registry.remove_peer(wallet(1)).await.unwrap();

        let fresh = h.registry.register_peer(wallet(1)).await.unwrap();
        assert!(fresh.is_new());
        assert_ne!(fresh.peer.public_key, old.public_key);
        assert!(!h.store.contains(&old.public_key).unwrap());
        assert!(h.store.contains(&fresh.peer.public_key).unwrap());
    }

    #[tokio::test]
    async fn test_crypto_unavailable() {
        struct NoEntropy;
        impl EntropySource for NoEntropy {
            fn fill(&self, _dest: &mut [u8]) -> Result<(), KeyError> {
                Err(KeyError::CryptoUnavailable("no entropy".into()))
            }
        }

        let h = harness_with_keys(KeyProvisioner::with_source(NoEntropy));

        let err = h.registry.register_peer(wallet(1)).await.unwrap_err();
        assert_matches!(err, RegistryError::CryptoUnavailable(_));
        assert_eq!(h.registry.allocator().leased_count(), 0);
        assert!(h.tunnel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_closed_registry_rejects_registration() {
        let h = harness();
        assert!(h.registry.close(Duration::from_secs(1)).await);
        assert_matches!(
            h.registry.register_peer(wallet(1)).await,
            Err(RegistryError::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn test_observations_require_matching_key() {
        let h = harness();
        let peer = h.registry.register_peer(wallet(1)).await.unwrap().peer;

        let stale = Observation {
            wallet: wallet(1),
            public_key: TunnelKey::from_bytes([0; 32]),
            total: 999,
            seen_at: Some(10),
        };
        let current = Observation {
            public_key: peer.public_key,
            total: 1500,
            ..stale
        };

        assert_eq!(h.registry.record_observations(&[stale]).unwrap(), 0);
        assert_eq!(h.registry.record_observations(&[current]).unwrap(), 1);

        let updated = h.registry.get(&wallet(1)).unwrap();
        assert_eq!(updated.cumulative_bytes, 1500);
        assert_eq!(updated.last_seen_at, Some(10));
        assert_eq!(h.store.get(&peer.public_key).unwrap().unwrap().cumulative_bytes, 1500);
    }

    #[tokio::test]
    async fn test_restore_reapplies_and_rolls_back() {
        let h = harness();
        let active = PeerIdentity {
            status: PeerStatus::Active,
            cumulative_bytes: 4096,
            ..PeerIdentity::pending(wallet(1), TunnelKey::from_bytes([1; 32]), Ipv4Addr::new(10, 0, 0, 2), 1)
        };
        let pending =
            PeerIdentity::pending(wallet(2), TunnelKey::from_bytes([2; 32]), Ipv4Addr::new(10, 0, 0, 3), 2);
        let revoked = PeerIdentity {
            status: PeerStatus::Revoked,
            ..PeerIdentity::pending(wallet(3), TunnelKey::from_bytes([3; 32]), Ipv4Addr::new(10, 0, 0, 4), 3)
        };
        h.store
            .save_batch(&[active.clone(), pending.clone(), revoked.clone()])
            .unwrap();

        let summary = h.registry.restore().await.unwrap();
        assert_eq!(
            summary,
            RestoreSummary {
                active: 2,
                pending: 0,
                revoked: 1,
                rolled_back: 0
            }
        );
        assert!(h.tunnel.has_peer(&active.public_key));
        assert!(h.tunnel.has_peer(&pending.public_key));
        assert!(!h.tunnel.has_peer(&revoked.public_key));
        assert_eq!(h.registry.get(&wallet(1)).unwrap().cumulative_bytes, 4096);
        assert_eq!(h.registry.get(&wallet(2)).unwrap().status, PeerStatus::Active);
        assert_eq!(h.registry.get(&wallet(3)).unwrap().status, PeerStatus::Revoked);
    }

    #[tokio::test]
    async fn test_restore_drops_unappliable_pending() {
        let h = harness();
        let pending =
            PeerIdentity::pending(wallet(2), TunnelKey::from_bytes([2; 32]), Ipv4Addr::new(10, 0, 0, 3), 2);
        h.store.save(&pending).unwrap();
        h.tunnel.fail_apply(true);

        let summary = h.registry.restore().await.unwrap();
        assert_eq!(summary.rolled_back, 1);
        assert!(h.registry.get(&wallet(2)).is_none());
        assert_eq!(h.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restore_keeps_unappliable_active_pending() {
        let h = harness();
        let active = PeerIdentity {
            status: PeerStatus::Active,
            ..PeerIdentity::pending(wallet(1), TunnelKey::from_bytes([1; 32]), Ipv4Addr::new(10, 0, 0, 2), 1)
        };
        h.store.save(&active).unwrap();
        h.tunnel.fail_apply(true);

        let summary = h.registry.restore().await.unwrap();
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.active, 0);
        assert_eq!(h.registry.get(&wallet(1)).unwrap().status, PeerStatus::Pending);
        assert!(h.registry.active_peers().is_empty());
        assert_eq!(
            h.store.get(&active.public_key).unwrap().map(|p| p.status),
            Some(PeerStatus::Pending)
        );

        // The next registration puts the same identity back on the interface.
        h.tunnel.fail_apply(false);
        let again = h.registry.register_peer(wallet(1)).await.unwrap();
        assert!(!again.is_new());
        assert_eq!(again.peer.public_key, active.public_key);
        assert_eq!(again.peer.status, PeerStatus::Active);
        assert!(h.tunnel.has_peer(&active.public_key));
    }

    #[tokio::test]
    async fn test_unappliable_leftover_is_replaced() {
        let h = harness();
        let leftover =
            PeerIdentity::pending(wallet(1), TunnelKey::from_bytes([1; 32]), Ipv4Addr::new(10, 0, 0, 2), 1);
        h.store.save(&leftover).unwrap();
        h.tunnel.fail_apply(true);
        h.registry.restore().await.unwrap();
        assert!(h.registry.get(&wallet(1)).is_none());

        // An active record that could not be re-applied stays pending until
        // a registration retries it.
        let active = PeerIdentity {
            status: PeerStatus::Active,
            ..leftover
        };
        h.store.save(&active).unwrap();
        h.registry.restore().await.unwrap();
        assert_eq!(h.registry.get(&wallet(1)).unwrap().status, PeerStatus::Pending);

        let err = h.registry.register_peer(wallet(1)).await.unwrap_err();
        assert_matches!(err, RegistryError::ApplyFailed(_));
        assert!(h.registry.get(&wallet(1)).is_none());
        assert!(!h.store.contains(&active.public_key).unwrap());
        assert_eq!(h.registry.allocator().leased_count(), 0);

        h.tunnel.fail_apply(false);
        let fresh = h.registry.register_peer(wallet(1)).await.unwrap();
        assert!(fresh.is_new());
        assert_ne!(fresh.peer.public_key, active.public_key);
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let h = harness();
        h.registry.register_peer(wallet(1)).await.unwrap();
        h.registry.register_peer(wallet(2)).await.unwrap();
        let calls_before = h.tunnel.calls().len();

        assert_eq!(h.registry.revoke_all().await.unwrap(), 2);
        assert_eq!(h.registry.live_count(), 0);
        assert_eq!(h.tunnel.calls().len(), calls_before);
        assert!(
            h.store
                .load_all()
                .unwrap()
                .iter()
                .all(|peer| peer.status == PeerStatus::Revoked)
        );
    }
}
