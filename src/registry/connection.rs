//! One tunneled TCP connection.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::ConnectionId;

/// Any byte stream the registry can hold.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> DuplexStream for T {}

/// Type-erased socket.
pub type BoxedStream = Box<dyn DuplexStream>;

/// A registered connection: a socket split into halves plus its own
/// cancellation token.
///
/// The read half is taken by exactly one pump. The write half is shared
/// behind an async mutex so channel-to-socket writes never interleave.
pub struct Connection {
    id: ConnectionId,
    reader: Mutex<Option<ReadHalf<BoxedStream>>>,
    writer: tokio::sync::Mutex<WriteHalf<BoxedStream>>,
    token: CancellationToken,
}

impl Connection {
    /// Wrap a connected socket.
    pub fn new(id: ConnectionId, stream: BoxedStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            id,
            reader: Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(writer),
            token: CancellationToken::new(),
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Cancelled when the connection is removed or the registry is reset.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the connection has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Take the read half. Only the first caller gets it.
    pub fn take_reader(&self) -> Option<ReadHalf<BoxedStream>> {
        self.reader.lock().take()
    }

    /// Write all of `data` to the socket.
    pub async fn write_all(&self, data: &[u8]) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        Ok(())
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Gracefully shut the write half down, giving up after `linger`.
    pub(crate) async fn shutdown(&self, linger: Duration) {
        let graceful = async {
            let mut writer = self.writer.lock().await;
            writer.shutdown().await
        };

        match tokio::time::timeout(linger, graceful).await {
            Ok(Ok(())) => tracing::trace!("Connection {} shut down", self.id),
            Ok(Err(e)) => tracing::debug!("Connection {} shutdown failed: {}", self.id, e),
            Err(_) => tracing::debug!("Connection {} linger expired", self.id),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
