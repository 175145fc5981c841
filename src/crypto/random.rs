//! OS entropy for handshake salts and connection ids.

use std::num::NonZeroU32;

use rand::RngCore;
use rand_core::OsRng;

use crate::crypto::SALT_SIZE;

/// Draws from the operating system's CSPRNG.
pub struct SecureRandom;

impl SecureRandom {
    /// One fresh handshake salt.
    pub fn salt() -> [u8; SALT_SIZE] {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    /// A uniformly random non-zero `u32`. Zero draws are retried.
    pub fn nonzero_u32() -> NonZeroU32 {
        loop {
            if let Some(value) = NonZeroU32::new(OsRng.next_u32()) {
                return value;
            }
        }
    }
}
