//! Peer lifecycle for the Wayfare node runner.
//!
//! - [`AddressAllocator`] - Hands out tunnel addresses in a /24
//! - [`PeerRegistry`] - Authoritative wallet → peer map, kept in step with the live interface
//! - [`PeerStore`] - Persistence for peer records ([`FilePeerStore`], [`MemoryPeerStore`])

mod allocator;
mod args;
mod error;
mod registry;
mod store;

pub use allocator::{AddressAllocator, FIRST_HOST, InvalidSubnet, LAST_HOST, NODE_HOST, PoolExhausted};
pub use args::{DEFAULT_SHUTDOWN_TIMEOUT_SECS, PeerArgs};
pub use error::RegistryError;
pub use registry::{Observation, PeerRegistry, Registration, RestoreSummary};
pub use store::{FilePeerStore, MemoryPeerStore, PeerStore, PeerStoreError};
