//! Peer registry CLI arguments.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

/// Default time to wait for in-flight registrations at shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Peer registry configuration.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Peers")]
#[serde(default)]
pub struct PeerArgs {
    /// Keep peers active across a restart instead of revoking them at shutdown.
    #[arg(long = "peers.retain-on-shutdown")]
    pub retain_on_shutdown: bool,

    /// Keep peer state in memory only.
    #[arg(long = "peers.ephemeral")]
    pub ephemeral: bool,

    /// Seconds to wait for in-flight registrations when shutting down.
    #[arg(
        long = "peers.shutdown-timeout",
        default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        value_name = "SECS"
    )]
    pub shutdown_timeout_secs: u64,
}

impl Default for PeerArgs {
    fn default() -> Self {
        Self {
            retain_on_shutdown: false,
            ephemeral: false,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl PeerArgs {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
