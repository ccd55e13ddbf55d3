//! Parser for `wg show <interface> dump` output.
//!
//! The first line describes the interface itself (private key, public key,
//! listen port, fwmark). Every following line describes one peer:
//!
//! ```text
//! public-key  preshared-key  endpoint  allowed-ips  latest-handshake  rx  tx  keepalive
//! ```
//!
//! Fields are tab separated. Lines that cannot be parsed are collected as
//! [`DumpLineError`]s and never stop the remaining lines from being read.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use wayfare_primitives::TunnelKey;

const INTERFACE_FIELDS: usize = 4;
const PEER_FIELDS: usize = 8;

/// Monotonic transfer counters for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl PeerCounters {
    pub const fn new(rx_bytes: u64, tx_bytes: u64) -> Self {
        Self { rx_bytes, tx_bytes }
    }

    /// Combined transfer, saturating on overflow.
    pub const fn total(&self) -> u64 {
        self.rx_bytes.saturating_add(self.tx_bytes)
    }
}

/// One peer as reported by the live interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpPeer {
    /// IPv4 networks routed to this peer. IPv6 entries are ignored.
    pub allowed_ips: Vec<Ipv4Net>,
    /// Unix seconds of the last handshake, 0 if never.
    pub latest_handshake: u64,
    pub counters: PeerCounters,
}

/// A line of dump output that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DumpLineError {
    #[error("line {line}: expected {PEER_FIELDS} fields, got {fields}")]
    FieldCount { line: usize, fields: usize },

    #[error("line {line}: invalid public key: {reason}")]
    Key { line: usize, reason: String },

    #[error("line {line}: invalid {field} counter `{value}`")]
    Counter {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// Point-in-time view of the live interface.
#[derive(Debug, Clone, Default)]
pub struct InterfaceDump {
    pub peers: HashMap<TunnelKey, DumpPeer>,
    /// Lines skipped while parsing, 1-based.
    pub errors: Vec<DumpLineError>,
}

impl InterfaceDump {
    /// Parse raw dump output. Never fails; bad lines end up in [`Self::errors`].
    pub fn parse(output: &str) -> Self {
        let mut dump = Self::default();

        for (index, raw) in output.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim_end_matches('\r');
            if raw.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = raw.split('\t').collect();
            match fields.len() {
                INTERFACE_FIELDS => continue,
                PEER_FIELDS => match parse_peer(line, &fields) {
                    Ok((key, peer)) => {
                        dump.peers.insert(key, peer);
                    }
                    Err(err) => dump.errors.push(err),
                },
                other => dump.errors.push(DumpLineError::FieldCount {
                    line,
                    fields: other,
                }),
            }
        }

        dump
    }

    /// Counters for a peer, if it is present on the interface.
    pub fn counters(&self, key: &TunnelKey) -> Option<PeerCounters> {
        self.peers.get(key).map(|peer| peer.counters)
    }

    /// Every IPv4 address routed to some peer that falls inside `subnet`.
    pub fn addresses_in(&self, subnet: &Ipv4Net) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let subnet = *subnet;
        self.peers
            .values()
            .flat_map(|peer| peer.allowed_ips.iter())
            .map(|net| net.addr())
            .filter(move |addr| subnet.contains(addr))
    }
}

fn parse_peer(line: usize, fields: &[&str]) -> Result<(TunnelKey, DumpPeer), DumpLineError> {
    let [key, _psk, _endpoint, allowed_ips, handshake, rx, tx, _keepalive] = fields else {
        return Err(DumpLineError::FieldCount {
            line,
            fields: fields.len(),
        });
    };

    let key: TunnelKey = key.parse().map_err(|e: wayfare_primitives::TunnelKeyError| {
        DumpLineError::Key {
            line,
            reason: e.to_string(),
        }
    })?;

    let counter = |field: &'static str, value: &str| {
        value.parse::<u64>().map_err(|_| DumpLineError::Counter {
            line,
            field,
            value: value.to_string(),
        })
    };
    let counters = PeerCounters::new(counter("rx", rx)?, counter("tx", tx)?);

    let allowed_ips = allowed_ips
        .split(',')
        .filter_map(|entry| entry.trim().parse::<Ipv4Net>().ok())
        .collect();

    Ok((
        key,
        DumpPeer {
            allowed_ips,
            latest_handshake: handshake.parse().unwrap_or(0),
            counters,
        },
    ))
}
