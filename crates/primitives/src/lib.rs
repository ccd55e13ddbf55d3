//! Core primitive types for the Wayfare node runner.
//!
//! This crate keeps only the types shared by every other crate in the
//! workspace. Behaviour lives in the crates that own it.
//!
//! # Types
//!
//! - [`WalletAddress`] - Client or provider wallet (20 bytes, `0x`-prefixed hex)
//! - [`TunnelKey`] - WireGuard public key (32 bytes, base64)
//! - [`PeerStatus`] - Lifecycle state of a tunnel peer
//! - [`PeerIdentity`] - One client attached to the node's tunnel

mod key;
mod peer;
mod time;

pub use key::{KEY_LEN, TunnelKey, TunnelKeyError};
pub use peer::{PeerIdentity, PeerStatus};
pub use time::unix_timestamp;

/// Wallet address of a client or node provider.
///
/// Parsed from and rendered as `0x`-prefixed hex. The backend validates
/// wallets against `^0x[a-fA-F0-9]{40}$`, which every rendered address matches.
pub type WalletAddress = alloy_primitives::Address;
