//! In-process transport pair for tests.

use bytes::BytesMut;
use tokio::sync::mpsc;

use crate::channel::transport::{Transport, TransportSink, TransportStream};
use crate::crypto::PresharedKey;
use crate::error::{Error, Result};
use crate::MuxConfig;

/// Small, fast configuration: cheap KDF and a 256-byte message limit.
pub fn test_config(key: &str) -> MuxConfig {
    let mut config = MuxConfig::new(PresharedKey::new(key));
    config.kdf_iterations = 2;
    config.max_message_size = 256;
    config
}

/// One end of an in-memory transport.
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunk: usize,
}

/// Create a connected pair. Messages are delivered in pieces of at most
/// `chunk` bytes to exercise reassembly.
pub fn pair(chunk: usize) -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport { tx: a_tx, rx: a_rx, chunk },
        MemoryTransport { tx: b_tx, rx: b_rx, chunk },
    )
}

impl MemoryTransport {
    /// Inject a raw message as if the peer had sent it.
    pub fn sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.tx.clone()
    }
}

impl Transport for MemoryTransport {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    fn split(self) -> (MemorySink, MemoryStream) {
        (
            MemorySink { tx: Some(self.tx) },
            MemoryStream {
                rx: self.rx,
                chunk: self.chunk.max(1),
                pending: None,
            },
        )
    }
}

/// Sending half; closing drops the sender.
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl TransportSink for MemorySink {
    async fn send_message(&mut self, data: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ChannelClosed)?;
        tx.send(data.to_vec()).map_err(|_| Error::ChannelClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Receiving half.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunk: usize,
    pending: Option<Vec<u8>>,
}

impl TransportStream for MemoryStream {
    async fn recv_chunk(&mut self, buf: &mut BytesMut, room: usize) -> Result<bool> {
        let mut message = match self.pending.take() {
            Some(rest) => rest,
            None => self.rx.recv().await.ok_or(Error::ChannelClosed)?,
        };

        let n = message.len().min(room).min(self.chunk);
        buf.extend_from_slice(&message[..n]);
        message.drain(..n);

        if message.is_empty() {
            Ok(true)
        } else {
            self.pending = Some(message);
            Ok(false)
        }
    }
}
