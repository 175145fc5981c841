//! Cryptographic primitives for the tunnel.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA512 key derivation from the pre-shared key
//! - ChaCha20-Poly1305 AEAD with per-direction counter nonces
//! - Secure random number generation
//!
//! All secret material is zeroized on drop to prevent memory leakage.

mod aead;
mod kdf;
mod random;

pub use aead::{AeadKey, Cipher, Nonce};
pub use kdf::{derive_key, PresharedKey, DEFAULT_KDF_ITERATIONS};
pub use random::SecureRandom;

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of each handshake salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of AEAD nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;
