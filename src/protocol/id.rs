//! Connection identifiers.

use std::fmt;
use std::num::NonZeroU32;

use crate::crypto::SecureRandom;
use crate::error::{Error, Result};

/// Size of a connection id on the wire.
pub const ID_SIZE: usize = 4;

/// Identifies one tunneled TCP connection on both ends of the channel.
///
/// Never zero. Carried little-endian in the suffix of every data frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(NonZeroU32);

impl ConnectionId {
    /// Draw a uniformly random non-zero id.
    pub fn random() -> Self {
        Self(SecureRandom::nonzero_u32())
    }

    /// Wrap a raw value; `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The raw value.
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Wire encoding.
    pub fn to_le_bytes(self) -> [u8; ID_SIZE] {
        self.0.get().to_le_bytes()
    }

    /// Decode from the wire. A zero id is malformed.
    pub fn from_le_bytes(bytes: [u8; ID_SIZE]) -> Result<Self> {
        Self::new(u32::from_le_bytes(bytes))
            .ok_or_else(|| Error::InvalidMessage("zero connection id".into()))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0.get())
    }
}
