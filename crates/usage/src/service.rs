//! Periodic usage and heartbeat loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use wayfare_tasks::Shutdown;

use crate::{Heartbeat, SettlementBackend, UsageMeter, UsageReporter};

/// Polls the interface on a fixed interval and reports the resulting usage.
pub struct UsageService<B> {
    meter: Arc<UsageMeter>,
    reporter: Arc<UsageReporter<B>>,
    interval: Duration,
}

impl<B: SettlementBackend + 'static> UsageService<B> {
    pub fn new(meter: Arc<UsageMeter>, reporter: Arc<UsageReporter<B>>, interval: Duration) -> Self {
        Self {
            meter,
            reporter,
            interval,
        }
    }

    /// Run until `shutdown` fires. The final poll is left to the caller so it
    /// can run after the registry has stopped changing.
    pub async fn run(self, shutdown: Shutdown) {
        info!(interval = ?self.interval, "Usage metering started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first poll waits one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Usage service shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let events = self.meter.poll().await;
                    self.reporter.report(events).await;
                }
            }
        }
    }
}

/// Keeps the node marked active on the backend.
pub struct HeartbeatService<B> {
    heartbeat: Arc<Heartbeat<B>>,
    interval: Duration,
}

impl<B: SettlementBackend + 'static> HeartbeatService<B> {
    pub fn new(heartbeat: Arc<Heartbeat<B>>, interval: Duration) -> Self {
        Self {
            heartbeat,
            interval,
        }
    }

    pub async fn run(self, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Heartbeat service shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Failures are logged by the heartbeat and retried next tick.
                    self.heartbeat.beat().await.ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use wayfare_peers::{AddressAllocator, MemoryPeerStore, PeerRegistry};
    use wayfare_primitives::WalletAddress;
    use wayfare_tasks::TaskManager;
    use wayfare_tunnel::mock::MockTunnel;

    use super::*;
    use crate::{
        BYTES_PER_MEGABYTE, BackendError, NodeAnnouncement, NodeStatus, ProviderArgs,
        ProviderIdentity, UsageEvent,
    };

    #[derive(Default)]
    struct Counting {
        usage: AtomicUsize,
        heartbeats: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl SettlementBackend for Counting {
        async fn announce(&self, _: &NodeAnnouncement) -> Result<(), BackendError> {
            Ok(())
        }

        async fn update_status(&self, status: &NodeStatus) -> Result<(), BackendError> {
            if status.active {
                self.heartbeats.fetch_add(1, Ordering::SeqCst);
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(())
        }

        async fn report_usage(&self, _: &UsageEvent) -> Result<(), BackendError> {
            self.usage.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_service_polls_on_interval() {
        let tunnel = Arc::new(MockTunnel::new());
        let allocator = AddressAllocator::new("10.0.0.0/24".parse().unwrap()).unwrap();
        let registry = Arc::new(PeerRegistry::new(
            allocator,
            tunnel.clone(),
            Arc::new(MemoryPeerStore::new()),
        ));
        let peer = registry
            .register_peer(WalletAddress::repeat_byte(1))
            .await
            .unwrap()
            .peer;
        tunnel.set_counters(&peer.public_key, BYTES_PER_MEGABYTE, 0);

        let meter = Arc::new(UsageMeter::new(
            registry,
            tunnel.clone(),
            ProviderIdentity {
                wallet: WalletAddress::repeat_byte(0xee),
                region: "IN-West".into(),
            },
        ));
        let reporter = Arc::new(UsageReporter::new(
            Counting::default(),
            16,
            Duration::from_secs(1),
        ));

        let manager = TaskManager::current();
        let service = UsageService::new(meter, reporter.clone(), Duration::from_secs(60));
        manager
            .executor()
            .spawn_with_graceful_shutdown("usage", |shutdown| service.run(shutdown));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reporter.backend().usage.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(reporter.backend().usage.load(Ordering::SeqCst), 1);

        assert!(manager.graceful_shutdown_with_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_service_beats() {
        let announcement = NodeAnnouncement::new(
            WalletAddress::repeat_byte(0xee),
            &ProviderArgs::default(),
            "vpn-node.local:51820",
        );
        let heartbeat = Arc::new(Heartbeat::new(
            Counting::default(),
            announcement,
            Duration::from_secs(1),
        ));

        let manager = TaskManager::current();
        let service = HeartbeatService::new(heartbeat.clone(), Duration::from_secs(120));
        manager
            .executor()
            .spawn_with_graceful_shutdown("heartbeat", |shutdown| service.run(shutdown));

        tokio::time::sleep(Duration::from_secs(241)).await;
        assert!(manager.graceful_shutdown_with_timeout(Duration::from_secs(1)).await);
        assert_eq!(heartbeat_count(&heartbeat), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_service_survives_failures() {
        let announcement = NodeAnnouncement::new(
            WalletAddress::repeat_byte(0xee),
            &ProviderArgs::default(),
            "vpn-node.local:51820",
        );
        let backend = Counting::default();
        backend.failing.store(true, Ordering::SeqCst);
        let heartbeat = Arc::new(Heartbeat::new(backend, announcement, Duration::from_secs(1)));

        let manager = TaskManager::current();
        let service = HeartbeatService::new(heartbeat.clone(), Duration::from_secs(120));
        manager
            .executor()
            .spawn_with_graceful_shutdown("heartbeat", |shutdown| service.run(shutdown));

        tokio::time::sleep(Duration::from_secs(361)).await;
        assert!(manager.graceful_shutdown_with_timeout(Duration::from_secs(1)).await);
        assert_eq!(heartbeat_count(&heartbeat), 3);
    }

    fn heartbeat_count(heartbeat: &Heartbeat<Counting>) -> usize {
        heartbeat.backend().heartbeats.load(Ordering::SeqCst)
    }
}
