//! Tunnel peer identity and lifecycle state.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::{TunnelKey, WalletAddress};

/// Lifecycle state of a tunnel peer.
///
/// ```text
/// Pending --apply ok--> Active --remove confirmed--> Revoked
/// Pending --apply failed--> (discarded)
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeerStatus {
    /// Committed to the registry, not yet confirmed on the live interface.
    Pending,
    /// Applied to the live interface.
    Active,
    /// Removed from the live interface. Terminal.
    Revoked,
}

impl PeerStatus {
    /// Whether the peer holds its address and key (Pending or Active).
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

/// One client attached to the node's tunnel.
///
/// The private key is deliberately absent: it is handed to the client once
/// at registration and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    /// Client wallet, unique per live peer.
    pub wallet: WalletAddress,
    /// WireGuard public key, immutable once assigned.
    pub public_key: TunnelKey,
    /// Address inside the node's tunnel subnet.
    pub virtual_address: Ipv4Addr,
    pub status: PeerStatus,
    /// Last observed rx+tx total, the baseline for the next usage delta.
    pub cumulative_bytes: u64,
    /// Unix seconds of the last poll that saw traffic.
    pub last_seen_at: Option<u64>,
    /// Unix seconds of registration.
    pub created_at: u64,
}

impl PeerIdentity {
    /// A fresh Pending identity with a zero baseline.
    pub fn pending(
        wallet: WalletAddress,
        public_key: TunnelKey,
        virtual_address: Ipv4Addr,
        created_at: u64,
    ) -> Self {
        Self {
            wallet,
            public_key,
            virtual_address,
            status: PeerStatus::Pending,
            cumulative_bytes: 0,
            last_seen_at: None,
            created_at,
        }
    }
}
