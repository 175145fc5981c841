//! Encrypted channel over one physical transport.
//!
//! A [`Channel`] pairs one transport with one [`Codec`]. It lives exactly as
//! long as one connection attempt: any failure surfaces to the caller, which
//! drops the channel and builds a new one on a new transport.

mod source;
mod transport;
mod websocket;

#[cfg(test)]
pub(crate) mod memory;

pub use source::{RateLimited, Singleton, TransportSource, WsDialer};
pub use transport::{Transport, TransportSink, TransportStream};
pub use websocket::{WsSink, WsStream};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{Codec, CodecState, ConnectionId, Side, FRAME_SUFFIX_SIZE, HANDSHAKE_SIZE};
use crate::MuxConfig;

/// One transport plus the codec protecting it.
///
/// Send and receive may run concurrently from different tasks. Sends are
/// serialized so frames hit the wire in the order their nonces were drawn.
pub struct Channel<T: Transport> {
    codec: Mutex<Codec>,
    sink: tokio::sync::Mutex<T::Sink>,
    stream: tokio::sync::Mutex<T::Stream>,
    max_message_size: usize,
}

impl<T: Transport> Channel<T> {
    /// Wrap a transport with a fresh codec. No I/O happens yet.
    pub fn new(side: Side, config: &MuxConfig, transport: T) -> Self {
        let (sink, stream) = transport.split();
        Self {
            codec: Mutex::new(Codec::new(side, config.key.clone(), config.kdf_iterations)),
            sink: tokio::sync::Mutex::new(sink),
            stream: tokio::sync::Mutex::new(stream),
            max_message_size: config.max_message_size,
        }
    }

    /// Wrap a transport and complete the handshake within the connect timeout.
    pub async fn establish(
        side: Side,
        config: &MuxConfig,
        transport: T,
        shutdown: &CancellationToken,
    ) -> Result<Self> {
        let channel = Self::new(side, config, transport);
        config
            .timeouts
            .connect_scope(shutdown)
            .run(channel.handshake_check())
            .await?;
        Ok(channel)
    }

    /// Current codec state.
    pub fn state(&self) -> CodecState {
        self.codec.lock().state()
    }

    /// Largest payload [`Channel::send`] accepts.
    pub fn max_payload(&self) -> usize {
        self.max_message_size.saturating_sub(FRAME_SUFFIX_SIZE)
    }

    /// Run the handshake if it has not run yet.
    ///
    /// Holds both halves so no data frame can interleave with it.
    pub async fn handshake_check(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let mut stream = self.stream.lock().await;

        match self.state() {
            CodecState::Active => return Ok(()),
            CodecState::Init => {}
            CodecState::Handshake => {
                self.codec.lock().fail();
                return Err(Error::handshake("previous handshake was interrupted"));
            }
            CodecState::Error => {
                return Err(Error::InvalidState("channel codec already failed".into()))
            }
        }

        let hello = self.codec.lock().init_handshake()?;

        let mut reply = BytesMut::with_capacity(HANDSHAKE_SIZE);
        let exchanged = async {
            sink.send_message(&hello).await?;
            read_message(&mut *stream, &mut reply, HANDSHAKE_SIZE).await
        }
        .await;

        if let Err(e) = exchanged {
            self.codec.lock().fail();
            return Err(match e {
                Error::MessageTooLarge { .. } => Error::handshake("oversized handshake message"),
                other => other,
            });
        }

        self.codec.lock().verify_handshake(&reply)?;
        tracing::debug!("Channel handshake complete");
        Ok(())
    }

    /// Seal `buf` for connection `id` and write it as one message.
    ///
    /// `buf` holds the payload on entry and the wire frame on return.
    pub async fn send(&self, buf: &mut BytesMut, id: ConnectionId) -> Result<()> {
        if buf.len() > self.max_payload() {
            return Err(Error::MessageTooLarge {
                limit: self.max_payload(),
            });
        }

        let mut sink = self.sink.lock().await;
        self.codec.lock().auth_message(buf, id)?;
        sink.send_message(buf).await
    }

    /// Receive one message, verify it and leave the payload in `buf`.
    pub async fn receive(&self, buf: &mut BytesMut) -> Result<ConnectionId> {
        let mut stream = self.stream.lock().await;

        buf.clear();
        read_message(&mut *stream, buf, self.max_message_size).await?;
        self.codec.lock().verify_message(buf)
    }

    /// Best-effort close notification to the peer.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::debug!("Channel close failed: {}", e);
        }
    }
}

/// Reassemble one message of at most `limit` bytes into `buf`.
async fn read_message<S: TransportStream>(
    stream: &mut S,
    buf: &mut BytesMut,
    limit: usize,
) -> Result<()> {
    loop {
        let room = limit.saturating_sub(buf.len());
        let complete = stream.recv_chunk(buf, room).await?;
        if complete {
            return Ok(());
        }
        if buf.len() >= limit {
            return Err(Error::MessageTooLarge { limit });
        }
        tracing::trace!("Partial channel read: {} bytes so far", buf.len());
    }
}
