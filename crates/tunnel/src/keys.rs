//! X25519 key provisioning for tunnel peers.

use std::fmt;
use std::sync::Arc;

use auto_impl::auto_impl;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use wayfare_primitives::{KEY_LEN, TunnelKey};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::KeyError;

/// Source of secret key bytes.
#[auto_impl(&, Box, Arc)]
pub trait EntropySource: Send + Sync {
    /// Fill `dest` with cryptographically secure random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), KeyError>;
}

/// The operating system's random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), KeyError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| KeyError::CryptoUnavailable(e.to_string()))
    }
}

/// Private half of a tunnel keypair.
///
/// Never persisted and never logged; `Debug` is redacted.
#[derive(Clone)]
pub struct TunnelSecret(StaticSecret);

impl TunnelSecret {
    /// Clamp raw bytes the way `wg genkey` does and wrap them.
    pub fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
        clamp(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Standard base64, as written to a client's `PrivateKey =` line.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.to_bytes())
    }

    /// The matching public key.
    pub fn public_key(&self) -> TunnelKey {
        TunnelKey::from_bytes(PublicKey::from(&self.0).to_bytes())
    }
}

impl fmt::Debug for TunnelSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TunnelSecret(<redacted>)")
    }
}

/// A freshly generated keypair.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub secret: TunnelSecret,
    pub public: TunnelKey,
}

/// Generates WireGuard-compatible keypairs.
#[derive(Clone)]
pub struct KeyProvisioner {
    source: Arc<dyn EntropySource>,
}

impl KeyProvisioner {
    /// Provisioner backed by the OS random source.
    pub fn new() -> Self {
        Self::with_source(OsEntropy)
    }

    /// Provisioner backed by a custom entropy source.
    pub fn with_source(source: impl EntropySource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Generate a new keypair.
    ///
    /// Fails with [`KeyError::CryptoUnavailable`] if no secure randomness is available.
    pub fn generate_keypair(&self) -> Result<Keypair, KeyError> {
        let mut bytes = [0u8; KEY_LEN];
        self.source.fill(&mut bytes)?;
        let secret = TunnelSecret::from_bytes(bytes);
        let public = secret.public_key();
        Ok(Keypair { secret, public })
    }
}

impl Default for KeyProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvisioner").finish_non_exhaustive()
    }
}

fn clamp(bytes: &mut [u8; KEY_LEN]) {
    bytes[0] &= 248;
    bytes[KEY_LEN - 1] &= 127;
    bytes[KEY_LEN - 1] |= 64;
}
