//! Usage metering and settlement for the Wayfare node runner.
//!
//! - [`UsageMeter`] - Diffs interface counters against per-peer baselines
//! - [`UsageReporter`] - Delivers [`UsageEvent`]s, retrying from a bounded queue
//! - [`SettlementBackend`] - Backend seam; [`HttpBackend`] speaks the HTTP/JSON API
//! - [`Heartbeat`] - Node announcement, heartbeat and offline status
//! - [`UsageService`], [`HeartbeatService`] - Periodic loops driven by a [`Shutdown`](wayfare_tasks::Shutdown)

mod args;
mod backend;
mod error;
mod event;
mod heartbeat;
mod meter;
mod reporter;
mod service;

pub use args::{
    BackendArgs, DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_CAPACITY_MBPS,
    DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_MAX_DELIVERY_ATTEMPTS, DEFAULT_MAX_PENDING, DEFAULT_PRICE_PER_GB, DEFAULT_REGION,
    DEFAULT_REPORT_INTERVAL_MS, DEFAULT_RETRY_DELAY_MS, ProviderArgs, UsageArgs,
};
pub use backend::{API_KEY_HEADER, HttpBackend, NodeAnnouncement, NodeStatus, SettlementBackend};
pub use error::BackendError;
pub use event::{BYTES_PER_MEGABYTE, Delta, UsageEvent, bytes_to_megabytes, compute_delta};
pub use heartbeat::Heartbeat;
pub use meter::{ProviderIdentity, UsageMeter};
pub use reporter::{ReportSummary, UsageReporter};
pub use service::{HeartbeatService, UsageService};
