//! Key Derivation Functions.
//!
//! Every key on the wire is PBKDF2-HMAC-SHA512 over the pre-shared key,
//! salted with handshake randomness. The iteration count is configurable so
//! tests can run fast; both ends must agree on it.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::crypto::{AeadKey, KEY_SIZE};

/// Iteration count used when the configuration does not override it.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// The secret both tunnel ends are configured with.
///
/// Zeroized when dropped.
#[derive(Clone)]
pub struct PresharedKey(Zeroizing<Vec<u8>>);

impl PresharedKey {
    /// Wrap a UTF-8 passphrase.
    pub fn new(passphrase: &str) -> Self {
        Self::from_bytes(passphrase.as_bytes())
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Length of the key material in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PresharedKey([REDACTED; {}])", self.0.len())
    }
}

/// Derive a 256-bit AEAD key from the pre-shared key and a salt.
///
/// Salts are concatenated by the caller when a key must bind both peers'
/// randomness.
pub fn derive_key(psk: &PresharedKey, salt: &[u8], iterations: u32) -> AeadKey {
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha512>(psk.as_bytes(), salt, iterations, &mut okm[..]);
    AeadKey::from_bytes(*okm)
}
