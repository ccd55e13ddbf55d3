//! Node infrastructure shared by the Wayfare node runner.
//!
//! - [`args`] - CLI/config args for logging, data directory, API and metrics
//! - [`logging`] - `tracing` subscriber setup
//! - [`dirs`] - data directory layout
//! - [`metrics`] - Prometheus exporter

pub mod args;
pub mod constants;
pub mod dirs;
pub mod logging;
pub mod metrics;
pub mod version;
