use std::net::Ipv4Addr;

use async_trait::async_trait;
use auto_impl::auto_impl;
use wayfare_primitives::TunnelKey;

use crate::{InterfaceDump, TunnelError};

/// The only component allowed to touch the live tunnel interface.
///
/// Peer add/remove must be idempotent: applying a peer that is already
/// present updates it in place, removing an absent peer succeeds.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait TunnelController: Send + Sync {
    /// Bring the interface up. Already up is not an error.
    async fn bring_up(&self) -> Result<(), TunnelError>;

    /// Tear the interface down. Already down is not an error.
    async fn tear_down(&self) -> Result<(), TunnelError>;

    /// Route `address/32` to the peer with `key`.
    async fn apply_peer(&self, key: &TunnelKey, address: Ipv4Addr) -> Result<(), TunnelError>;

    /// Remove the peer with `key` from the interface.
    async fn remove_peer(&self, key: &TunnelKey) -> Result<(), TunnelError>;

    /// Snapshot of per-peer counters and routes.
    ///
    /// Fails with [`TunnelError::InterfaceUnavailable`] while the interface is down.
    async fn dump(&self) -> Result<InterfaceDump, TunnelError>;

    /// Public key of the interface itself, handed to clients as the server key.
    async fn interface_public_key(&self) -> Result<TunnelKey, TunnelError>;
}
