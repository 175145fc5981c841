//! # wsmux
//!
//! Tunnels many independent TCP connections through a single encrypted
//! WebSocket link, multiplexing them by connection id and re-establishing
//! the link transparently when it fails.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │     Endpoints (TCP listener side / WebSocket side)      │
//! ├─────────────────────────────────────────────────────────┤
//! │  Multiplexer (reconnect loop, receive pump, pump set)   │
//! ├────────────────────────────┬────────────────────────────┤
//! │  Registry (id → socket)    │  Channel (transport+codec) │
//! ├────────────────────────────┴────────────────────────────┤
//! │  Codec (salted handshake, per-frame AEAD, 4-byte ids)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto Layer (PBKDF2-SHA512, ChaCha20-Poly1305)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Containment
//!
//! 1. **Connection-local**: a socket error closes only that connection
//! 2. **Channel-level**: a transport, codec or send failure tears down
//!    every connection and triggers a reconnect
//! 3. **Shutdown**: cancelling the root token ends every loop

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod buffer;
pub mod channel;
pub mod crypto;
pub mod error;
pub mod mux;
pub mod protocol;
pub mod registry;
pub mod timing;

#[cfg(feature = "server")]
pub mod server;

pub use error::{Error, Result};

use crypto::{PresharedKey, DEFAULT_KDF_ITERATIONS};
use timing::Timeouts;

/// Largest logical channel message accepted by default (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Configuration shared by both ends of a tunnel
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Pre-shared key both ends derive every cipher from
    pub key: PresharedKey,
    /// PBKDF2 iteration count (must match the peer)
    pub kdf_iterations: u32,
    /// Upper bound on one reassembled channel message, frame suffix included
    pub max_message_size: usize,
    /// Idle, send, connect, reconnect and linger durations
    pub timeouts: Timeouts,
}

impl MuxConfig {
    /// Create a configuration with default limits for the given key.
    pub fn new(key: PresharedKey) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            key: PresharedKey::from_bytes(&[]),
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            timeouts: Timeouts::default(),
        }
    }
}
