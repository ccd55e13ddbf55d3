//! Delivery of usage events to the settlement backend.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{BackendError, DEFAULT_MAX_DELIVERY_ATTEMPTS, SettlementBackend, UsageEvent};

/// Outcome of one [`UsageReporter::report`] cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub delivered: usize,
    /// Events still waiting for a later cycle.
    pub pending: usize,
    /// Events discarded because the queue was full or they ran out of attempts.
    pub dropped: usize,
    /// Events the backend refused outright.
    pub rejected: usize,
    /// Events below the backend's resolution.
    pub skipped: usize,
}

/// Hands usage events to a [`SettlementBackend`], keeping undelivered ones
/// in a bounded in-memory queue for the next cycle.
///
/// Delivery is in order. A transient failure stops the cycle so a backend
/// outage does not cost one timeout per queued event. An event the backend
/// rejects, or one that has failed `max_attempts` times, is dropped so it
/// cannot hold back the events behind it.
#[derive(Debug)]
pub struct UsageReporter<B> {
    backend: B,
    pending: Mutex<VecDeque<Queued>>,
    capacity: usize,
    timeout: Duration,
    max_attempts: u32,
}

#[derive(Debug)]
struct Queued {
    event: UsageEvent,
    attempts: u32,
}

impl<B: SettlementBackend> UsageReporter<B> {
    pub fn new(backend: B, capacity: usize, timeout: Duration) -> Self {
        Self {
            backend,
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            timeout,
            max_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
        }
    }

    /// Set how many times one event is tried before it is dropped.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of events waiting for delivery.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Queue `events` and try to deliver everything queued.
    pub async fn report(&self, events: Vec<UsageEvent>) -> ReportSummary {
        let mut summary = ReportSummary::default();
        self.enqueue(events, &mut summary);

        loop {
            let Some(mut queued) = self.pending.lock().pop_front() else {
                break;
            };
            let event = &queued.event;

            let err = match self.deliver(event).await {
                Ok(()) => {
                    summary.delivered += 1;
                    metrics::counter!("wayfare_usage_delivered_total").increment(1);
                    debug!(wallet = %event.wallet, mb = event.megabytes_used, "Usage delivered");
                    continue;
                }
                Err(err) => err,
            };
            metrics::counter!("wayfare_usage_delivery_failures_total").increment(1);

            if !err.is_transient() {
                warn!(wallet = %event.wallet, mb = event.megabytes_used, %err, "Backend rejected usage, dropping it");
                metrics::counter!("wayfare_usage_rejected_total").increment(1);
                summary.rejected += 1;
                continue;
            }

            queued.attempts += 1;
            if queued.attempts >= self.max_attempts {
                warn!(
                    wallet = %event.wallet,
                    mb = event.megabytes_used,
                    attempts = queued.attempts,
                    %err,
                    "Usage delivery failed too many times, dropping it"
                );
                metrics::counter!("wayfare_usage_dropped_total").increment(1);
                summary.dropped += 1;
                continue;
            }

            warn!(wallet = %event.wallet, mb = event.megabytes_used, %err, "Usage delivery failed, keeping for next cycle");
            self.pending.lock().push_front(queued);
            break;
        }

        summary.pending = self.pending_len();
        if summary.delivered > 0 {
            info!(delivered = summary.delivered, pending = summary.pending, "Reported usage");
        }
        summary
    }

    fn enqueue(&self, events: Vec<UsageEvent>, summary: &mut ReportSummary) {
        let mut pending = self.pending.lock();
        for event in events {
            if !event.is_billable() {
                debug!(wallet = %event.wallet, bytes = event.bytes, "Skipping usage below 0.01 MB");
                summary.skipped += 1;
                continue;
            }
            if pending.len() >= self.capacity
                && let Some(Queued { event: oldest, .. }) = pending.pop_front()
            {
                warn!(wallet = %oldest.wallet, mb = oldest.megabytes_used, "Usage queue full, dropping oldest event");
                metrics::counter!("wayfare_usage_dropped_total").increment(1);
                summary.dropped += 1;
            }
            pending.push_back(Queued { event, attempts: 0 });
        }
    }

    async fn deliver(&self, event: &UsageEvent) -> Result<(), BackendError> {
        tokio::time::timeout(self.timeout, self.backend.report_usage(event))
            .await
            .map_err(|_| BackendError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use wayfare_primitives::WalletAddress;

    use super::*;
    use crate::{NodeAnnouncement, NodeStatus};

    #[derive(Default)]
    struct RecordingBackend {
        delivered: Mutex<Vec<UsageEvent>>,
        failing: AtomicBool,
        rejected_wallet: Mutex<Option<WalletAddress>>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl SettlementBackend for RecordingBackend {
        async fn announce(&self, _: &NodeAnnouncement) -> Result<(), BackendError> {
            Ok(())
        }

        async fn update_status(&self, _: &NodeStatus) -> Result<(), BackendError> {
            Ok(())
        }

        async fn report_usage(&self, event: &UsageEvent) -> Result<(), BackendError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if *self.rejected_wallet.lock() == Some(event.wallet) {
                return Err(BackendError::Status {
                    status: 400,
                    body: "Invalid mbUsed value".into(),
                });
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            self.delivered.lock().push(event.clone());
            Ok(())
        }
    }

    fn event(n: u8, megabytes_used: f64) -> UsageEvent {
        UsageEvent {
            wallet: WalletAddress::repeat_byte(n),
            provider_wallet: WalletAddress::repeat_byte(0xee),
            region: "IN-West".into(),
            megabytes_used,
            bytes: (megabytes_used * 1_048_576.0) as u64,
            observed_at: u64::from(n),
        }
    }

    fn reporter(capacity: usize) -> UsageReporter<RecordingBackend> {
        UsageReporter::new(RecordingBackend::default(), capacity, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let reporter = reporter(16);

        let summary = reporter.report(vec![event(1, 1.0), event(2, 2.0)]).await;

        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.pending, 0);
        let delivered = reporter.backend().delivered.lock().clone();
        assert_eq!(delivered, vec![event(1, 1.0), event(2, 2.0)]);
    }

    #[tokio::test]
    async fn test_failed_events_retry_next_cycle() {
        let reporter = reporter(16);
        reporter.backend().failing.store(true, Ordering::SeqCst);

        let summary = reporter.report(vec![event(1, 1.0), event(2, 2.0)]).await;
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.pending, 2);
        // The cycle stops at the first failure.
        assert_eq!(reporter.backend().attempts.load(Ordering::SeqCst), 1);

        reporter.backend().failing.store(false, Ordering::SeqCst);
        let summary = reporter.report(vec![event(3, 3.0)]).await;
        assert_eq!(summary.delivered, 3);
        let wallets: Vec<_> = reporter
            .backend()
            .delivered
            .lock()
            .iter()
            .map(|e| e.wallet)
            .collect();
        assert_eq!(
            wallets,
            vec![
                WalletAddress::repeat_byte(1),
                WalletAddress::repeat_byte(2),
                WalletAddress::repeat_byte(3)
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_event_does_not_block_queue() {
        let reporter = reporter(16);
        *reporter.backend().rejected_wallet.lock() = Some(WalletAddress::repeat_byte(1));

        let summary = reporter.report(vec![event(1, 1.0), event(2, 2.0)]).await;
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.pending, 0);

        for n in 3..6 {
            let summary = reporter.report(vec![event(1, 1.0), event(n, 1.0)]).await;
            assert_eq!(summary.delivered, 1);
            assert_eq!(summary.pending, 0);
        }
        assert_eq!(reporter.backend().delivered.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_event_dropped_after_max_attempts() {
        let reporter = reporter(16).with_max_attempts(2);
        reporter.backend().failing.store(true, Ordering::SeqCst);

        let summary = reporter.report(vec![event(1, 1.0), event(2, 2.0)]).await;
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.dropped, 0);

        // The head event runs out of attempts; the next one takes its place.
        let summary = reporter.report(Vec::new()).await;
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(reporter.backend().attempts.load(Ordering::SeqCst), 3);

        reporter.backend().failing.store(false, Ordering::SeqCst);
        let summary = reporter.report(Vec::new()).await;
        assert_eq!(summary.delivered, 1);
        let delivered = reporter.backend().delivered.lock().clone();
        assert_eq!(delivered, vec![event(2, 2.0)]);
    }

    #[tokio::test]
    async fn test_zero_megabyte_events_are_skipped() {
        let reporter = reporter(16);
        let summary = reporter.report(vec![event(1, 0.0)]).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(reporter.backend().attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest() {
        let reporter = reporter(2);
        reporter.backend().failing.store(true, Ordering::SeqCst);

        let summary = reporter
            .report(vec![event(1, 1.0), event(2, 1.0), event(3, 1.0)])
            .await;
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.pending, 2);

        reporter.backend().failing.store(false, Ordering::SeqCst);
        reporter.report(Vec::new()).await;
        let first = reporter.backend().delivered.lock().first().map(|e| e.wallet);
        assert_eq!(first, Some(WalletAddress::repeat_byte(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        struct Stuck;

        #[async_trait]
        impl SettlementBackend for Stuck {
            async fn announce(&self, _: &NodeAnnouncement) -> Result<(), BackendError> {
                Ok(())
            }
            async fn update_status(&self, _: &NodeStatus) -> Result<(), BackendError> {
                Ok(())
            }
            async fn report_usage(&self, _: &UsageEvent) -> Result<(), BackendError> {
                std::future::pending().await
            }
        }

        let reporter = UsageReporter::new(Stuck, 4, Duration::from_secs(5));
        let summary = reporter.report(vec![event(1, 1.0)]).await;
        assert_eq!(summary.pending, 1);
    }
}
