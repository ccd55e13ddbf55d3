//! Registration backend: node announcement, status and usage settlement.

use std::time::Duration;

use async_trait::async_trait;
use auto_impl::auto_impl;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, warn};
use wayfare_primitives::WalletAddress;

use crate::{BackendArgs, BackendError, ProviderArgs, UsageEvent};

/// Header carrying the backend API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Body of `POST /nodes` announcing this node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAnnouncement {
    pub wallet: WalletAddress,
    pub region: String,
    #[serde(rename = "pricePerGB")]
    pub price_per_gb: f64,
    pub endpoint: String,
    pub capacity_mbps: u32,
    pub active: bool,
}

impl NodeAnnouncement {
    pub fn new(wallet: WalletAddress, provider: &ProviderArgs, endpoint: impl Into<String>) -> Self {
        Self {
            wallet,
            region: provider.region.clone(),
            price_per_gb: provider.price_per_gb,
            endpoint: endpoint.into(),
            capacity_mbps: provider.capacity_mbps,
            active: true,
        }
    }
}

/// Body of `POST /nodes` for heartbeats and going offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub wallet: WalletAddress,
    pub active: bool,
}

/// Body of `POST /usage`. `(userWallet, observedAt)` identifies an event, so
/// the backend can drop a retried delivery it already stored.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageReport<'a> {
    user_wallet: WalletAddress,
    provider_wallet: WalletAddress,
    region: &'a str,
    mb_used: f64,
    observed_at: u64,
}

impl<'a> From<&'a UsageEvent> for UsageReport<'a> {
    fn from(event: &'a UsageEvent) -> Self {
        Self {
            user_wallet: event.wallet,
            provider_wallet: event.provider_wallet,
            region: &event.region,
            mb_used: event.megabytes_used,
            observed_at: event.observed_at,
        }
    }
}

/// Where usage is settled and node presence is recorded.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait SettlementBackend: Send + Sync {
    async fn announce(&self, announcement: &NodeAnnouncement) -> Result<(), BackendError>;

    async fn update_status(&self, status: &NodeStatus) -> Result<(), BackendError>;

    async fn report_usage(&self, event: &UsageEvent) -> Result<(), BackendError>;
}

/// [`SettlementBackend`] over HTTP/JSON.
///
/// Every request is bounded by the client timeout and retried once after
/// a short delay if the failure looks transient.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    api_key: Option<String>,
    retry_delay: Duration,
}

impl HttpBackend {
    pub fn new(url: &str, args: &BackendArgs) -> Result<Self, BackendError> {
        let mut base = Url::parse(url).map_err(|e| BackendError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl {
                url: url.to_string(),
                reason: "not a base url".to_string(),
            });
        }
        // Url::join replaces the last segment unless the path ends in `/`.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(args.timeout())
            .build()
            .map_err(BackendError::Client)?;

        Ok(Self {
            client,
            base,
            api_key: args.api_key.clone(),
            retry_delay: args.retry_delay(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), BackendError> {
        let url = self.base.join(path).map_err(|e| BackendError::InvalidUrl {
            url: format!("{}{path}", self.base),
            reason: e.to_string(),
        })?;

        match self.send(&url, body).await {
            Err(err) if err.is_transient() => {
                debug!(%url, %err, "Backend request failed, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.send(&url, body).await
            }
            result => result,
        }
    }

    async fn send<T: Serialize + Sync>(&self, url: &Url, body: &T) -> Result<(), BackendError> {
        let mut request = self.client.post(url.clone()).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Request(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(%url, "Backend rejected the API key");
        }
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SettlementBackend for HttpBackend {
    async fn announce(&self, announcement: &NodeAnnouncement) -> Result<(), BackendError> {
        self.post("nodes", announcement).await
    }

    async fn update_status(&self, status: &NodeStatus) -> Result<(), BackendError> {
        self.post("nodes", status).await
    }

    async fn report_usage(&self, event: &UsageEvent) -> Result<(), BackendError> {
        self.post("usage", &UsageReport::from(event)).await
    }
}
