//! Virtual address allocation inside the node's /24 tunnel subnet.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use parking_lot::Mutex;
use tracing::trace;

/// Host octet held by the node's own interface.
pub const NODE_HOST: u8 = 1;

/// Lowest host octet handed to peers.
pub const FIRST_HOST: u8 = 2;

/// Highest host octet handed to peers.
pub const LAST_HOST: u8 = 254;

/// Every host in the pool is either in use or leased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("address pool {subnet} exhausted")]
pub struct PoolExhausted {
    pub subnet: Ipv4Net,
}

/// The tunnel subnet is not a /24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("tunnel subnet {0} must be a /24")]
pub struct InvalidSubnet(pub Ipv4Net);

/// Hands out host octets in `[FIRST_HOST, LAST_HOST]`.
///
/// The caller passes the set of hosts currently in use on every call; the
/// allocator additionally remembers hosts it has leased but that have not
/// been released yet, so two allocations racing ahead of their commits can
/// never collide.
#[derive(Debug)]
pub struct AddressAllocator {
    subnet: Ipv4Net,
    leased: Mutex<BTreeSet<u8>>,
}

impl AddressAllocator {
    pub fn new(subnet: Ipv4Net) -> Result<Self, InvalidSubnet> {
        if subnet.prefix_len() != 24 {
            return Err(InvalidSubnet(subnet));
        }
        Ok(Self {
            subnet: subnet.trunc(),
            leased: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn subnet(&self) -> &Ipv4Net {
        &self.subnet
    }

    /// Address of the node's own interface.
    pub fn node_address(&self) -> Ipv4Addr {
        self.address_of(NODE_HOST)
    }

    /// Lease the lowest host that is neither in `used` nor already leased.
    pub fn allocate(&self, used: &BTreeSet<u8>) -> Result<u8, PoolExhausted> {
        let mut leased = self.leased.lock();
        let host = (FIRST_HOST..=LAST_HOST)
            .find(|host| !used.contains(host) && !leased.contains(host))
            .ok_or(PoolExhausted {
                subnet: self.subnet,
            })?;
        leased.insert(host);
        trace!(host, "Leased address");
        Ok(host)
    }

    /// Return a host to the pool. Releasing an unleased host is a no-op.
    pub fn release(&self, host: u8) {
        if self.leased.lock().remove(&host) {
            trace!(host, "Released address");
        }
    }

    pub fn is_leased(&self, host: u8) -> bool {
        self.leased.lock().contains(&host)
    }

    /// Number of hosts currently leased.
    pub fn leased_count(&self) -> usize {
        self.leased.lock().len()
    }

    /// Full address for a host octet.
    pub fn address_of(&self, host: u8) -> Ipv4Addr {
        let [a, b, c, _] = self.subnet.network().octets();
        Ipv4Addr::new(a, b, c, host)
    }

    /// Host octet of an address, if it lies in the subnet.
    pub fn host_of(&self, address: Ipv4Addr) -> Option<u8> {
        if !self.subnet.contains(&address) {
            return None;
        }
        let [_, _, _, host] = address.octets();
        Some(host)
    }
}
