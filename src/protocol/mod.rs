//! Tunnel wire protocol.
//!
//! Both ends share a pre-shared key. Each side sends one handshake message
//! of fresh salts authenticated under a key derived from the pre-shared key;
//! once both are verified, every data frame is sealed with a per-direction
//! ChaCha20-Poly1305 cipher and carries the id of the connection it belongs
//! to. A zero-length payload means "this connection reached EOF".

mod codec;
mod id;
mod message;

pub use codec::{Codec, CodecState};
pub use id::{ConnectionId, ID_SIZE};
pub use message::{HandshakeMessage, FRAME_SUFFIX_SIZE, HANDSHAKE_SIZE};

use std::fmt;

/// Which end of the transport this process is.
///
/// Decides which derived key encrypts and which decrypts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Accepted the WebSocket
    Listener,
    /// Dialed the WebSocket
    Connector,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Listener => write!(f, "listener"),
            Side::Connector => write!(f, "connector"),
        }
    }
}
