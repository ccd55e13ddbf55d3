//! Backend, provider and metering CLI arguments.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};
use wayfare_primitives::WalletAddress;

/// Default region advertised to the backend.
pub const DEFAULT_REGION: &str = "IN-West";

/// Default advertised price per GB.
pub const DEFAULT_PRICE_PER_GB: f64 = 1.5;

/// Default advertised capacity in Mbps.
pub const DEFAULT_CAPACITY_MBPS: u32 = 100;

/// Default usage poll interval in milliseconds.
pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 60_000;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 120;

/// Default number of undelivered usage events kept for retry.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Default number of delivery attempts before a usage event is given up on.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Default timeout for a single backend request in seconds.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;

/// Default delay before the single retry of a failed backend request, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Registration backend connection.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Backend")]
#[serde(default)]
pub struct BackendArgs {
    /// Base URL of the registration backend, e.g. `https://api.example.com/api`.
    #[arg(long = "backend.url", env = "BACKEND_URL", value_name = "URL")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API key sent as `x-api-key`.
    #[arg(long = "backend.api-key", env = "API_KEY", value_name = "KEY", hide_env_values = true)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Timeout for each backend request, in seconds.
    #[arg(
        long = "backend.timeout",
        default_value_t = DEFAULT_BACKEND_TIMEOUT_SECS,
        value_name = "SECS"
    )]
    pub timeout_secs: u64,

    /// Delay before retrying a failed request once, in milliseconds.
    #[arg(
        long = "backend.retry-delay",
        default_value_t = DEFAULT_RETRY_DELAY_MS,
        value_name = "MS"
    )]
    pub retry_delay_ms: u64,
}

impl Default for BackendArgs {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl BackendArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Upper bound for one logical request, including its retry.
    pub fn delivery_timeout(&self) -> Duration {
        self.timeout() * 2 + self.retry_delay()
    }
}

/// How this node presents itself on the marketplace.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq)]
#[command(next_help_heading = "Provider")]
#[serde(default)]
pub struct ProviderArgs {
    /// Wallet that receives payment for this node's bandwidth.
    #[arg(long = "provider.wallet", env = "PROVIDER_WALLET", value_name = "ADDRESS")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletAddress>,

    /// Region advertised to clients.
    #[arg(long = "provider.region", env = "REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Price per GB.
    #[arg(long = "provider.price-per-gb", env = "PRICE_PER_GB", default_value_t = DEFAULT_PRICE_PER_GB)]
    pub price_per_gb: f64,

    /// Advertised capacity in Mbps.
    #[arg(long = "provider.capacity", env = "CAPACITY_MBPS", default_value_t = DEFAULT_CAPACITY_MBPS, value_name = "MBPS")]
    pub capacity_mbps: u32,
}

impl Default for ProviderArgs {
    fn default() -> Self {
        Self {
            wallet: None,
            region: DEFAULT_REGION.to_string(),
            price_per_gb: DEFAULT_PRICE_PER_GB,
            capacity_mbps: DEFAULT_CAPACITY_MBPS,
        }
    }
}

/// Usage metering and heartbeat cadence.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Usage")]
#[serde(default)]
pub struct UsageArgs {
    /// Interval between usage polls, in milliseconds.
    #[arg(
        long = "usage.interval",
        env = "REPORT_INTERVAL_MS",
        default_value_t = DEFAULT_REPORT_INTERVAL_MS,
        value_name = "MS"
    )]
    pub report_interval_ms: u64,

    /// Interval between heartbeats, in seconds.
    #[arg(
        long = "usage.heartbeat-interval",
        default_value_t = DEFAULT_HEARTBEAT_INTERVAL_SECS,
        value_name = "SECS"
    )]
    pub heartbeat_interval_secs: u64,

    /// Maximum undelivered usage events held for retry.
    #[arg(long = "usage.max-pending", default_value_t = DEFAULT_MAX_PENDING)]
    pub max_pending: usize,

    /// Delivery attempts for one usage event before it is dropped.
    #[arg(long = "usage.max-attempts", default_value_t = DEFAULT_MAX_DELIVERY_ATTEMPTS)]
    pub max_attempts: u32,
}

impl Default for UsageArgs {
    fn default() -> Self {
        Self {
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            max_pending: DEFAULT_MAX_PENDING,
            max_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
        }
    }
}

impl UsageArgs {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
