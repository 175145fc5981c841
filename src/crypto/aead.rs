//! Authenticated Encryption with Associated Data (AEAD).
//!
//! Uses ChaCha20-Poly1305 with a detached 16-byte tag so frames can be
//! sealed in place inside pooled buffers. Each [`Cipher`] owns a 64-bit
//! nonce counter that advances on every seal/open; a cipher is tied to one
//! direction of one channel and is never rewound.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Tag,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// A symmetric key for AEAD operations.
///
/// Automatically zeroized when dropped.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a new AEAD key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// A nonce (number used once) for AEAD operations.
///
/// The counter is placed in the last 8 bytes (little-endian); the first
/// 4 bytes are zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from a 64-bit counter value.
    pub fn new(counter: u64) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[4..12].copy_from_slice(&counter.to_le_bytes());
        Self(nonce)
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Get the counter value (for diagnostics).
    pub fn counter(&self) -> u64 {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.0[4..12]);
        u64::from_le_bytes(counter)
    }
}

/// One direction of ChaCha20-Poly1305 with its own nonce counter.
pub struct Cipher {
    aead: ChaCha20Poly1305,
    counter: u64,
}

impl Cipher {
    /// Create a cipher whose counter starts at zero.
    pub fn new(key: &AeadKey) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(key.as_bytes().into()),
            counter: 0,
        }
    }

    /// Number of nonces consumed so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Authenticate `aad` without encrypting anything.
    pub fn tag(&mut self, aad: &[u8]) -> Result<[u8; TAG_SIZE]> {
        self.seal_in_place(aad, &mut [])
    }

    /// Verify a tag produced by [`Cipher::tag`] over the same `aad`.
    pub fn verify_tag(&mut self, aad: &[u8], tag: &[u8]) -> Result<()> {
        self.open_in_place(aad, &mut [], tag)
    }

    /// Encrypt `buffer` in place, returning the detached tag.
    pub fn seal_in_place(&mut self, aad: &[u8], buffer: &mut [u8]) -> Result<[u8; TAG_SIZE]> {
        let nonce = self.next_nonce()?;
        let tag = self
            .aead
            .encrypt_in_place_detached(nonce.as_bytes().into(), aad, buffer)
            .map_err(|_| Error::crypto("in-place encryption failed"))?;

        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(tag.as_slice());
        Ok(out)
    }

    /// Verify `tag` and decrypt `buffer` in place.
    ///
    /// The buffer is only decrypted once the tag has been verified.
    pub fn open_in_place(&mut self, aad: &[u8], buffer: &mut [u8], tag: &[u8]) -> Result<()> {
        if tag.len() != TAG_SIZE {
            return Err(Error::Buffer {
                expected: TAG_SIZE,
                actual: tag.len(),
            });
        }

        let nonce = self.next_nonce()?;
        self.aead
            .decrypt_in_place_detached(nonce.as_bytes().into(), aad, buffer, Tag::from_slice(tag))
            .map_err(|_| Error::Authentication)
    }

    fn next_nonce(&mut self) -> Result<Nonce> {
        if self.counter == u64::MAX {
            return Err(Error::crypto("nonce counter exhausted"));
        }
        let nonce = Nonce::new(self.counter);
        self.counter += 1;
        Ok(nonce)
    }
}
