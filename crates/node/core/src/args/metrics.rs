//! Metrics exporter CLI arguments.

use crate::constants::{DEFAULT_LOCALHOST_ADDR, DEFAULT_METRICS_PORT};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Prometheus exporter configuration.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Metrics")]
#[serde(default)]
pub struct MetricsArgs {
    /// Enable the Prometheus metrics endpoint.
    #[arg(long = "metrics")]
    pub enabled: bool,

    /// Metrics listen address.
    #[arg(id = "metrics.addr", long = "metrics.addr", default_value = DEFAULT_LOCALHOST_ADDR)]
    pub addr: IpAddr,

    /// Metrics listen port.
    #[arg(id = "metrics.port", long = "metrics.port", default_value_t = DEFAULT_METRICS_PORT)]
    pub port: u16,
}

impl Default for MetricsArgs {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_METRICS_PORT,
        }
    }
}

impl MetricsArgs {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}
