//! In-memory [`TunnelController`] for tests.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use wayfare_primitives::TunnelKey;

use crate::{DumpPeer, InterfaceDump, PeerCounters, TunnelController, TunnelError};

const MOCK_INTERFACE: &str = "mock0";

/// A recorded controller invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelCall {
    BringUp,
    TearDown,
    Apply(TunnelKey, Ipv4Addr),
    Remove(TunnelKey),
    Dump,
}

#[derive(Debug)]
struct MockState {
    up: bool,
    peers: BTreeMap<TunnelKey, Ipv4Addr>,
    counters: HashMap<TunnelKey, PeerCounters>,
    fail_apply: bool,
    fail_remove: bool,
    apply_delay: Option<Duration>,
    public_key: TunnelKey,
    calls: Vec<TunnelCall>,
}

/// Tunnel controller keeping the "live" peer set in memory.
///
/// Starts up, with no peers. Failures can be injected per operation.
#[derive(Debug)]
pub struct MockTunnel {
    state: Mutex<MockState>,
}

impl Default for MockTunnel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTunnel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                up: true,
                peers: BTreeMap::new(),
                counters: HashMap::new(),
                fail_apply: false,
                fail_remove: false,
                apply_delay: None,
                public_key: TunnelKey::from_bytes([0x42; 32]),
                calls: Vec::new(),
            }),
        }
    }

    /// Mark the interface up or down.
    pub fn set_up(&self, up: bool) {
        self.state.lock().up = up;
    }

    /// Make every subsequent `apply_peer` fail.
    pub fn fail_apply(&self, fail: bool) {
        self.state.lock().fail_apply = fail;
    }

    /// Make every subsequent `remove_peer` fail.
    pub fn fail_remove(&self, fail: bool) {
        self.state.lock().fail_remove = fail;
    }

    /// Make every subsequent `apply_peer` take `delay` before it runs.
    pub fn set_apply_delay(&self, delay: Option<Duration>) {
        self.state.lock().apply_delay = delay;
    }

    /// Set the cumulative counters reported for `key`.
    pub fn set_counters(&self, key: &TunnelKey, rx_bytes: u64, tx_bytes: u64) {
        self.state
            .lock()
            .counters
            .insert(*key, PeerCounters::new(rx_bytes, tx_bytes));
    }

    /// Place a peer on the interface without going through the controller,
    /// as if configured out of band.
    pub fn insert_live_peer(&self, key: TunnelKey, address: Ipv4Addr) {
        self.state.lock().peers.insert(key, address);
    }

    /// Peers currently on the interface.
    pub fn live_peers(&self) -> BTreeMap<TunnelKey, Ipv4Addr> {
        self.state.lock().peers.clone()
    }

    pub fn has_peer(&self, key: &TunnelKey) -> bool {
        self.state.lock().peers.contains_key(key)
    }

    pub fn is_up(&self) -> bool {
        self.state.lock().up
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<TunnelCall> {
        self.state.lock().calls.clone()
    }

    fn unavailable() -> TunnelError {
        TunnelError::InterfaceUnavailable {
            interface: MOCK_INTERFACE.to_string(),
            reason: "interface down".to_string(),
        }
    }
}

#[async_trait]
impl TunnelController for MockTunnel {
    async fn bring_up(&self) -> Result<(), TunnelError> {
        let mut state = self.state.lock();
        state.calls.push(TunnelCall::BringUp);
        state.up = true;
        Ok(())
    }

    async fn tear_down(&self) -> Result<(), TunnelError> {
        let mut state = self.state.lock();
        state.calls.push(TunnelCall::TearDown);
        state.up = false;
        state.peers.clear();
        Ok(())
    }

    async fn apply_peer(&self, key: &TunnelKey, address: Ipv4Addr) -> Result<(), TunnelError> {
        let delay = self.state.lock().apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.calls.push(TunnelCall::Apply(*key, address));
        if state.fail_apply {
            return Err(TunnelError::Interface {
                command: format!("wg set {MOCK_INTERFACE} peer {key}"),
                reason: "injected apply failure".to_string(),
            });
        }
        if !state.up {
            return Err(Self::unavailable());
        }
        state.peers.insert(*key, address);
        Ok(())
    }

    async fn remove_peer(&self, key: &TunnelKey) -> Result<(), TunnelError> {
        let mut state = self.state.lock();
        state.calls.push(TunnelCall::Remove(*key));
        if state.fail_remove {
            return Err(TunnelError::Interface {
                command: format!("wg set {MOCK_INTERFACE} peer {key} remove"),
                reason: "injected remove failure".to_string(),
            });
        }
        state.peers.remove(key);
        Ok(())
    }

    async fn dump(&self) -> Result<InterfaceDump, TunnelError> {
        let mut state = self.state.lock();
        state.calls.push(TunnelCall::Dump);
        if !state.up {
            return Err(Self::unavailable());
        }

        let peers = state
            .peers
            .iter()
            .map(|(key, address)| {
                let peer = DumpPeer {
                    allowed_ips: vec![Ipv4Net::from(*address)],
                    latest_handshake: 0,
                    counters: state.counters.get(key).copied().unwrap_or_default(),
                };
                (*key, peer)
            })
            .collect();

        Ok(InterfaceDump {
            peers,
            errors: Vec::new(),
        })
    }

    async fn interface_public_key(&self) -> Result<TunnelKey, TunnelError> {
        let state = self.state.lock();
        if !state.up {
            return Err(Self::unavailable());
        }
        Ok(state.public_key)
    }
}
