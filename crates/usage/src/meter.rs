//! Turns live interface counters into usage events.

use std::sync::Arc;

use tracing::{debug, warn};
use wayfare_peers::{Observation, PeerRegistry};
use wayfare_primitives::{WalletAddress, unix_timestamp};
use wayfare_tunnel::{InterfaceDump, TunnelController};

use crate::{UsageEvent, bytes_to_megabytes, compute_delta};

/// Identity stamped on every usage event produced by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub wallet: WalletAddress,
    pub region: String,
}

/// Diffs counter snapshots against the registry's per-peer baselines.
///
/// Each byte is billed exactly once: the baseline moves to the observed
/// total in the same step that produces the event, and is persisted by the
/// registry before the poll returns. Traffic below billing resolution
/// (0.01 MB) leaves the baseline where it is and is billed once it adds up.
pub struct UsageMeter {
    registry: Arc<PeerRegistry>,
    tunnel: Arc<dyn TunnelController>,
    provider: ProviderIdentity,
}

impl UsageMeter {
    pub fn new(
        registry: Arc<PeerRegistry>,
        tunnel: Arc<dyn TunnelController>,
        provider: ProviderIdentity,
    ) -> Self {
        Self {
            registry,
            tunnel,
            provider,
        }
    }

    /// Read the interface and meter it. An unavailable interface yields no events.
    pub async fn poll(&self) -> Vec<UsageEvent> {
        match self.tunnel.dump().await {
            Ok(dump) => self.poll_once(&dump),
            Err(err) if err.is_unavailable() => {
                debug!(%err, "Interface unavailable, skipping usage poll");
                Vec::new()
            }
            Err(err) => {
                warn!(%err, "Failed to read interface counters");
                Vec::new()
            }
        }
    }

    /// Meter one counter snapshot.
    pub fn poll_once(&self, dump: &InterfaceDump) -> Vec<UsageEvent> {
        let now = unix_timestamp();
        let mut events = Vec::new();
        let mut observations = Vec::new();

        for peer in self.registry.active_peers() {
            let Some(counters) = dump.counters(&peer.public_key) else {
                continue;
            };
            let total = counters.total();
            let Some(delta) = compute_delta(peer.cumulative_bytes, total) else {
                continue;
            };

            if delta.reset {
                metrics::counter!("wayfare_usage_counter_resets_total").increment(1);
                warn!(
                    wallet = %peer.wallet,
                    baseline = peer.cumulative_bytes,
                    total,
                    "Counter went backwards, billing from zero"
                );
            }

            let billable = bytes_to_megabytes(delta.bytes) > 0.0;
            let baseline = match (billable, delta.reset) {
                (true, _) => total,
                (false, true) => 0,
                (false, false) => peer.cumulative_bytes,
            };
            observations.push(Observation {
                wallet: peer.wallet,
                public_key: peer.public_key,
                total: baseline,
                seen_at: (delta.bytes > 0).then_some(now),
            });

            if billable {
                events.push(UsageEvent {
                    wallet: peer.wallet,
                    provider_wallet: self.provider.wallet,
                    region: self.provider.region.clone(),
                    megabytes_used: bytes_to_megabytes(delta.bytes),
                    bytes: delta.bytes,
                    observed_at: now,
                });
            }
        }

        if let Err(err) = self.registry.record_observations(&observations) {
            warn!(%err, "Failed to persist usage baselines");
        }

        if !events.is_empty() {
            let bytes: u64 = events.iter().map(|e| e.bytes).sum();
            metrics::counter!("wayfare_usage_events_total").increment(events.len() as u64);
            metrics::counter!("wayfare_usage_bytes_total").increment(bytes);
            debug!(events = events.len(), bytes, "Metered usage");
        }
        events
    }
}

impl std::fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMeter")
            .field("registry", &self.registry)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}
