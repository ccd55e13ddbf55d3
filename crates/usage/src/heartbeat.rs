//! Node presence on the marketplace.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{BackendError, NodeAnnouncement, NodeStatus, SettlementBackend};

/// Announces the node, keeps it marked active and marks it offline on exit.
#[derive(Debug)]
pub struct Heartbeat<B> {
    backend: B,
    announcement: NodeAnnouncement,
    timeout: Duration,
}

impl<B: SettlementBackend> Heartbeat<B> {
    pub fn new(backend: B, announcement: NodeAnnouncement, timeout: Duration) -> Self {
        Self {
            backend,
            announcement,
            timeout,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn announcement(&self) -> &NodeAnnouncement {
        &self.announcement
    }

    /// Register the node with its full advertisement.
    pub async fn announce(&self) -> Result<(), BackendError> {
        let result = self
            .bounded(self.backend.announce(&self.announcement))
            .await;
        match &result {
            Ok(()) => info!(
                wallet = %self.announcement.wallet,
                region = %self.announcement.region,
                endpoint = %self.announcement.endpoint,
                "Node announced"
            ),
            Err(err) => warn!(%err, "Node announcement failed"),
        }
        result
    }

    /// Mark the node active.
    pub async fn beat(&self) -> Result<(), BackendError> {
        let result = self.send_status(true).await;
        match &result {
            Ok(()) => debug!("Heartbeat sent"),
            Err(err) => {
                metrics::counter!("wayfare_heartbeat_failures_total").increment(1);
                warn!(%err, "Heartbeat failed");
            }
        }
        result
    }

    /// Mark the node offline.
    pub async fn offline(&self) -> Result<(), BackendError> {
        let result = self.send_status(false).await;
        match &result {
            Ok(()) => info!("Node marked offline"),
            Err(err) => warn!(%err, "Failed to mark node offline"),
        }
        result
    }

    async fn send_status(&self, active: bool) -> Result<(), BackendError> {
        let status = NodeStatus {
            wallet: self.announcement.wallet,
            active,
        };
        self.bounded(self.backend.update_status(&status)).await
    }

    async fn bounded<F>(&self, request: F) -> Result<(), BackendError>
    where
        F: Future<Output = Result<(), BackendError>>,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| BackendError::Timeout)?
    }
}
