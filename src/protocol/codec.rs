//! Handshake and per-frame authenticated encryption.
//!
//! One [`Codec`] serves one channel for its whole life:
//!
//! ```text
//! Init ──init_handshake──▶ Handshake ──verify_handshake──▶ Active
//!   │                          │                             │
//!   └──────────── any failure ─┴─────────────────────────────┴──▶ Error
//! ```
//!
//! `Error` is absorbing; a reconnect builds a fresh codec.

use bytes::BytesMut;

use crate::buffer::Frame;
use crate::crypto::{derive_key, Cipher, PresharedKey, SALT_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::protocol::message::{HandshakeMessage, FRAME_SUFFIX_SIZE, HANDSHAKE_SIZE};
use crate::protocol::{ConnectionId, Side, ID_SIZE};

/// Codec lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    /// Nothing sent yet
    Init,
    /// Local handshake sent, waiting for the peer's
    Handshake,
    /// Both directional ciphers ready
    Active,
    /// A step failed; every further call fails
    Error,
}

/// Handshake state machine plus the two directional ciphers.
pub struct Codec {
    side: Side,
    key: PresharedKey,
    iterations: u32,
    state: CodecState,
    local: Option<HandshakeMessage>,
    encryptor: Option<Cipher>,
    decryptor: Option<Cipher>,
}

impl Codec {
    /// Create a codec in `Init`.
    pub fn new(side: Side, key: PresharedKey, iterations: u32) -> Self {
        Self {
            side,
            key,
            iterations,
            state: CodecState::Init,
            local: None,
            encryptor: None,
            decryptor: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> CodecState {
        self.state
    }

    /// Which end this codec serves.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Produce this side's handshake message. `Init → Handshake`.
    pub fn init_handshake(&mut self) -> Result<[u8; HANDSHAKE_SIZE]> {
        let result = self.build_handshake();
        self.track(result, CodecState::Handshake)
    }

    /// Verify the peer's handshake message and derive both ciphers.
    /// `Handshake → Active`.
    pub fn verify_handshake(&mut self, data: &[u8]) -> Result<()> {
        let result = self.accept_handshake(data);
        self.track(result, CodecState::Active)
    }

    /// Seal the payload in `buf` for connection `id`.
    ///
    /// Appends the encrypted id and the tag; `buf` then holds the complete
    /// wire frame.
    pub fn auth_message(&mut self, buf: &mut BytesMut, id: ConnectionId) -> Result<()> {
        let result = self.seal(buf, id);
        if result.is_err() {
            buf.clear();
        }
        self.track(result, CodecState::Active)
    }

    /// Verify and decrypt a received frame in place.
    ///
    /// On success `buf` holds only the payload. On failure it is cleared so
    /// no unauthenticated plaintext escapes.
    pub fn verify_message(&mut self, buf: &mut BytesMut) -> Result<ConnectionId> {
        let result = self.open(buf);
        if result.is_err() {
            buf.clear();
        }
        self.track(result, CodecState::Active)
    }

    /// Force the codec into `Error`, e.g. when the transport failed mid-handshake.
    pub fn fail(&mut self) {
        self.state = CodecState::Error;
    }

    fn track<T>(&mut self, result: Result<T>, next: CodecState) -> Result<T> {
        self.state = match result {
            Ok(_) => next,
            Err(_) => CodecState::Error,
        };
        result
    }

    fn expect_state(&self, expected: CodecState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "codec is {:?}, expected {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn build_handshake(&mut self) -> Result<[u8; HANDSHAKE_SIZE]> {
        self.expect_state(CodecState::Init)?;

        let mut msg = HandshakeMessage::random();
        let init_key = derive_key(&self.key, &msg.init_salt, self.iterations);
        msg.tag = Cipher::new(&init_key).tag(&msg.salt_pair())?;

        let wire = msg.encode();
        self.local = Some(msg);
        Ok(wire)
    }

    fn accept_handshake(&mut self, data: &[u8]) -> Result<()> {
        self.expect_state(CodecState::Handshake)?;

        let peer = HandshakeMessage::decode(data)?;
        let init_key = derive_key(&self.key, &peer.init_salt, self.iterations);
        Cipher::new(&init_key)
            .verify_tag(&peer.salt_pair(), &peer.tag)
            .map_err(|_| Error::handshake("peer handshake tag does not verify"))?;

        let local = self
            .local
            .take()
            .ok_or_else(|| Error::InvalidState("local handshake missing".into()))?;

        let (listener, connector) = match self.side {
            Side::Listener => (&local, &peer),
            Side::Connector => (&peer, &local),
        };
        let to_connector = self.derive(&listener.writer_salt, &connector.reader_salt);
        let to_listener = self.derive(&listener.reader_salt, &connector.writer_salt);

        let (encryptor, decryptor) = match self.side {
            Side::Listener => (to_connector, to_listener),
            Side::Connector => (to_listener, to_connector),
        };
        self.encryptor = Some(encryptor);
        self.decryptor = Some(decryptor);
        Ok(())
    }

    fn derive(&self, first: &[u8; SALT_SIZE], second: &[u8; SALT_SIZE]) -> Cipher {
        let mut salt = [0u8; 2 * SALT_SIZE];
        salt[..SALT_SIZE].copy_from_slice(first);
        salt[SALT_SIZE..].copy_from_slice(second);
        Cipher::new(&derive_key(&self.key, &salt, self.iterations))
    }

    fn seal(&mut self, buf: &mut BytesMut, id: ConnectionId) -> Result<()> {
        self.expect_state(CodecState::Active)?;
        let encryptor = self
            .encryptor
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no encryptor".into()))?;

        let mut frame = Frame::extend(buf, FRAME_SUFFIX_SIZE);
        frame.suffix_mut()[..ID_SIZE].copy_from_slice(&id.to_le_bytes());

        let complete = frame.complete_mut();
        let at = complete.len() - TAG_SIZE;
        let (sealed, tag) = complete.split_at_mut(at);
        tag.copy_from_slice(&encryptor.seal_in_place(b"", sealed)?);
        Ok(())
    }

    fn open(&mut self, buf: &mut BytesMut) -> Result<ConnectionId> {
        self.expect_state(CodecState::Active)?;
        let decryptor = self
            .decryptor
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no decryptor".into()))?;

        let mut frame = Frame::parse(buf, FRAME_SUFFIX_SIZE).map_err(|_| {
            Error::InvalidMessage(format!("frame shorter than {} bytes", FRAME_SUFFIX_SIZE))
        })?;

        let complete = frame.complete_mut();
        let at = complete.len() - TAG_SIZE;
        let (sealed, tag) = complete.split_at_mut(at);
        decryptor.open_in_place(b"", sealed, tag)?;

        let mut raw = [0u8; ID_SIZE];
        raw.copy_from_slice(&frame.suffix()[..ID_SIZE]);
        let id = ConnectionId::from_le_bytes(raw)?;

        frame.into_message();
        Ok(id)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("side", &self.side)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
