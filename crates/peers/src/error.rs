use wayfare_primitives::WalletAddress;
use wayfare_tunnel::{KeyError, TunnelError};

use crate::{PeerStoreError, PoolExhausted};

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No secure randomness for a new keypair.
    #[error("crypto unavailable: {0}")]
    CryptoUnavailable(String),

    #[error(transparent)]
    PoolExhausted(#[from] PoolExhausted),

    /// The new peer could not be applied to the live interface; nothing was kept.
    #[error("failed to apply peer: {0}")]
    ApplyFailed(#[source] TunnelError),

    /// The peer could not be removed from the live interface; it stays active.
    #[error("interface error: {0}")]
    InterfaceError(#[source] TunnelError),

    #[error("unknown peer {0}")]
    NotFound(WalletAddress),

    /// The registry is closing and accepts no new peers.
    #[error("registry is shutting down")]
    ShuttingDown,

    #[error("peer store: {0}")]
    Store(#[from] PeerStoreError),

    /// The task running the mutation panicked or was cancelled.
    #[error("peer mutation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<KeyError> for RegistryError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::CryptoUnavailable(reason) => Self::CryptoUnavailable(reason),
        }
    }
}
