//! Tunnel identity and live interface control for the Wayfare node runner.
//!
//! - [`KeyProvisioner`] - Generates WireGuard-compatible X25519 keypairs
//! - [`TunnelController`] - Seam over the live interface; [`WgController`] drives `wg`/`wg-quick`
//! - [`InterfaceDump`] - Parsed `wg show <iface> dump` counters
//! - [`ClientConfig`] - Client-side `wg-quick` config for a registered peer
//!
//! Enable the `test-utils` feature for `MockTunnel`, an in-memory controller.

mod args;
mod client_config;
mod command;
mod controller;
mod dump;
mod error;
mod keys;
mod wg;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use args::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_DNS, DEFAULT_ENDPOINT, DEFAULT_INTERFACE,
    DEFAULT_KEEPALIVE, DEFAULT_SUBNET, TunnelArgs, default_subnet,
};
pub use client_config::ClientConfig;
pub use command::{CommandOutput, CommandRunner, ProcessRunner};
pub use controller::TunnelController;
pub use dump::{DumpLineError, DumpPeer, InterfaceDump, PeerCounters};
pub use error::{KeyError, TunnelError};
pub use keys::{EntropySource, KeyProvisioner, Keypair, OsEntropy, TunnelSecret};
pub use wg::WgController;
