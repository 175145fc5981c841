//! Error types for the tunnel.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tunneling.
#[derive(Error, Debug)]
pub enum Error {
    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Handshake message was malformed or its tag did not verify
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Per-message authentication tag mismatch
    #[error("authentication failed")]
    Authentication,

    /// Operation attempted in the wrong codec state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid message format
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// A transport message did not fit in the receive buffer
    #[error("message exceeds {limit} byte limit")]
    MessageTooLarge { limit: usize },

    /// Buffer overflow/underflow
    #[error("buffer error: expected {expected} bytes, got {actual}")]
    Buffer { expected: usize, actual: usize },

    /// A timed scope expired
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The enclosing scope was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Socket I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// WebSocket transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer closed the transport
    #[error("channel closed by peer")]
    ChannelClosed,

    /// An unknown connection id could not be resolved
    #[error("cannot resolve connection {id}: {reason}")]
    Resolve { id: String, reason: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::Handshake(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new resolve error for the given connection
    pub fn resolve(id: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::Resolve {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Authentication | Error::Handshake(_))
    }

    /// Check if a timed scope expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Check if the enclosing scope was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ChannelClosed,
            WsError::Io(io) => Error::Network(io),
            other => Error::transport(other.to_string()),
        }
    }
}
