//! WireGuard public key newtype.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a Curve25519 key in bytes.
pub const KEY_LEN: usize = 32;

/// Errors parsing a [`TunnelKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelKeyError {
    /// Input is not valid standard base64.
    #[error("invalid base64: {0}")]
    Base64(String),

    /// Decoded key has the wrong length.
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    Length(usize),
}

/// WireGuard public key of a tunnel peer.
///
/// Rendered as standard base64 with padding (44 characters), the exact
/// encoding `wg` accepts in `wg set ... peer <key>` and prints in dumps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TunnelKey([u8; KEY_LEN]);

impl TunnelKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Standard base64 encoding.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode from standard base64, rejecting anything that is not exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, TunnelKeyError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TunnelKeyError::Base64(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| TunnelKeyError::Length(decoded.len()))?;
        Ok(Self(bytes))
    }

    /// First eight characters of the encoding, for log lines.
    pub fn short(&self) -> String {
        let mut encoded = self.to_base64();
        encoded.truncate(8);
        encoded
    }
}

impl fmt::Display for TunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for TunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TunnelKey({})", self.to_base64())
    }
}

impl FromStr for TunnelKey {
    type Err = TunnelKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl From<[u8; KEY_LEN]> for TunnelKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for TunnelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for TunnelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
