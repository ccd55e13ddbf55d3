//! Local peer management API CLI arguments.

use crate::constants::{DEFAULT_API_PORT, DEFAULT_LOCALHOST_ADDR};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Local API server configuration.
#[derive(Debug, Args, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[command(next_help_heading = "API")]
#[serde(default)]
pub struct ApiArgs {
    /// Peer API listen address.
    #[arg(id = "api.addr", long = "api.addr", default_value = DEFAULT_LOCALHOST_ADDR)]
    pub addr: IpAddr,

    /// Peer API listen port.
    #[arg(id = "api.port", long = "api.port", env = "PORT", default_value_t = DEFAULT_API_PORT)]
    pub port: u16,
}

impl Default for ApiArgs {
    fn default() -> Self {
        Self {
            addr: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_API_PORT,
        }
    }
}

impl ApiArgs {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}
