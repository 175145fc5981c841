//! Wire layouts.
//!
//! Handshake (112 bytes):
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬─────────┐
//! │ reader salt  │ writer salt  │  init salt   │   tag   │
//! │     32       │     32       │     32       │   16    │
//! └──────────────┴──────────────┴──────────────┴─────────┘
//! ```
//!
//! Data frame:
//!
//! ```text
//! ┌───────────────────────┬────────┬─────────┐
//! │ payload (encrypted)   │ id (LE)│   tag   │
//! │        0..N           │  4 enc │   16    │
//! └───────────────────────┴────────┴─────────┘
//! ```

use crate::crypto::{SecureRandom, SALT_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::protocol::ID_SIZE;

/// Size of the handshake message.
pub const HANDSHAKE_SIZE: usize = 3 * SALT_SIZE + TAG_SIZE;

/// Bytes appended to every data payload: id then tag.
pub const FRAME_SUFFIX_SIZE: usize = ID_SIZE + TAG_SIZE;

/// One side's handshake contribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessage {
    /// Salt for the key this side will read with
    pub reader_salt: [u8; SALT_SIZE],
    /// Salt for the key this side will write with
    pub writer_salt: [u8; SALT_SIZE],
    /// Salt for the one-time key authenticating this message
    pub init_salt: [u8; SALT_SIZE],
    /// AEAD tag over `reader_salt || writer_salt`
    pub tag: [u8; TAG_SIZE],
}

impl HandshakeMessage {
    /// Draw fresh salts; the tag is left zeroed for the codec to fill.
    pub fn random() -> Self {
        Self {
            reader_salt: SecureRandom::salt(),
            writer_salt: SecureRandom::salt(),
            init_salt: SecureRandom::salt(),
            tag: [0u8; TAG_SIZE],
        }
    }

    /// The 64 bytes covered by the tag.
    pub fn salt_pair(&self) -> [u8; 2 * SALT_SIZE] {
        let mut aad = [0u8; 2 * SALT_SIZE];
        aad[..SALT_SIZE].copy_from_slice(&self.reader_salt);
        aad[SALT_SIZE..].copy_from_slice(&self.writer_salt);
        aad
    }

    /// Encode to the wire layout.
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut out = [0u8; HANDSHAKE_SIZE];
        out[..SALT_SIZE].copy_from_slice(&self.reader_salt);
        out[SALT_SIZE..2 * SALT_SIZE].copy_from_slice(&self.writer_salt);
        out[2 * SALT_SIZE..3 * SALT_SIZE].copy_from_slice(&self.init_salt);
        out[3 * SALT_SIZE..].copy_from_slice(&self.tag);
        out
    }

    /// Decode from the wire layout. Anything but exactly 112 bytes is rejected.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != HANDSHAKE_SIZE {
            return Err(Error::handshake(format!(
                "expected {} bytes, got {}",
                HANDSHAKE_SIZE,
                data.len()
            )));
        }

        let mut msg = Self {
            reader_salt: [0u8; SALT_SIZE],
            writer_salt: [0u8; SALT_SIZE],
            init_salt: [0u8; SALT_SIZE],
            tag: [0u8; TAG_SIZE],
        };
        msg.reader_salt.copy_from_slice(&data[..SALT_SIZE]);
        msg.writer_salt.copy_from_slice(&data[SALT_SIZE..2 * SALT_SIZE]);
        msg.init_salt.copy_from_slice(&data[2 * SALT_SIZE..3 * SALT_SIZE]);
        msg.tag.copy_from_slice(&data[3 * SALT_SIZE..]);
        Ok(msg)
    }
}
