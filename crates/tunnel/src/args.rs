//! Tunnel CLI arguments.

use std::net::Ipv4Addr;
use std::time::Duration;

use clap::Args;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Default WireGuard interface name.
pub const DEFAULT_INTERFACE: &str = "wg0";

/// Default tunnel subnet. The node itself holds `.1`.
pub const DEFAULT_SUBNET: &str = "10.0.0.0/24";

/// Default public endpoint clients dial.
pub const DEFAULT_ENDPOINT: &str = "vpn-node.local:51820";

/// Default DNS server pushed to clients.
pub const DEFAULT_DNS: &str = "1.1.1.1";

/// Default persistent keepalive in seconds.
pub const DEFAULT_KEEPALIVE: u16 = 25;

/// Default timeout for a single `wg`/`wg-quick` invocation in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Live tunnel interface configuration.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "Tunnel")]
#[serde(default)]
pub struct TunnelArgs {
    /// WireGuard interface name.
    #[arg(long = "tunnel.interface", env = "VPN_INTERFACE", default_value = DEFAULT_INTERFACE)]
    pub interface: String,

    /// Tunnel subnet, must be a /24.
    #[arg(long = "tunnel.subnet", default_value = DEFAULT_SUBNET, value_name = "CIDR")]
    pub subnet: Ipv4Net,

    /// Public `host:port` clients connect to.
    #[arg(long = "tunnel.endpoint", env = "ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// DNS server written into client configs.
    #[arg(long = "tunnel.dns", default_value = DEFAULT_DNS)]
    pub dns: String,

    /// Persistent keepalive for peers, in seconds.
    #[arg(long = "tunnel.keepalive", default_value_t = DEFAULT_KEEPALIVE, value_name = "SECS")]
    pub keepalive: u16,

    /// Timeout for each `wg`/`wg-quick` invocation, in seconds.
    #[arg(
        long = "tunnel.command-timeout",
        default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS,
        value_name = "SECS"
    )]
    pub command_timeout_secs: u64,

    /// Run tunnel commands through `sudo`.
    #[arg(long = "tunnel.sudo")]
    pub sudo: bool,
}

impl Default for TunnelArgs {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            subnet: default_subnet(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            dns: DEFAULT_DNS.to_string(),
            keepalive: DEFAULT_KEEPALIVE,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            sudo: false,
        }
    }
}

/// [`DEFAULT_SUBNET`] as a network.
pub fn default_subnet() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap_or_default()
}

impl TunnelArgs {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
