//! WireGuard client configuration handed to a newly registered peer.

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;
use wayfare_primitives::TunnelKey;

use crate::{TunnelArgs, TunnelSecret};

/// Everything a client needs to join the node's tunnel.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    private_key: String,
    pub address: Ipv4Addr,
    pub dns: String,
    pub server_public_key: TunnelKey,
    pub endpoint: String,
    pub allowed_ips: String,
    pub keepalive: u16,
}

impl ClientConfig {
    /// Client config routing all IPv4 traffic through the node.
    pub fn new(
        secret: &TunnelSecret,
        address: Ipv4Addr,
        server_public_key: TunnelKey,
        args: &TunnelArgs,
    ) -> Self {
        Self {
            private_key: secret.to_base64(),
            address,
            dns: args.dns.clone(),
            server_public_key,
            endpoint: args.endpoint.clone(),
            allowed_ips: "0.0.0.0/0".to_string(),
            keepalive: args.keepalive,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("server_public_key", &self.server_public_key)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Renders the `wg-quick` file format.
impl fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Interface]")?;
        writeln!(f, "PrivateKey = {}", self.private_key)?;
        writeln!(f, "Address = {}/32", self.address)?;
        writeln!(f, "DNS = {}", self.dns)?;
        writeln!(f)?;
        writeln!(f, "[Peer]")?;
        writeln!(f, "PublicKey = {}", self.server_public_key)?;
        writeln!(f, "Endpoint = {}", self.endpoint)?;
        writeln!(f, "AllowedIPs = {}", self.allowed_ips)?;
        writeln!(f, "PersistentKeepalive = {}", self.keepalive)
    }
}
