//! Message transport abstraction.
//!
//! A transport carries whole binary messages in both directions. The
//! receiving half may hand a message over in several chunks; the channel
//! reassembles them.

use std::future::Future;

use bytes::BytesMut;

use crate::error::Result;

/// A bidirectional message transport that can be split into halves.
pub trait Transport: Send + 'static {
    /// Sending half
    type Sink: TransportSink;
    /// Receiving half
    type Stream: TransportStream;

    /// Split into independently lockable halves.
    fn split(self) -> (Self::Sink, Self::Stream);
}

/// Sending half of a [`Transport`].
pub trait TransportSink: Send + 'static {
    /// Send `data` as one complete binary message.
    fn send_message(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Tell the peer we are going away.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Receiving half of a [`Transport`].
pub trait TransportStream: Send + 'static {
    /// Append at most `room` bytes of the current message to `buf`.
    ///
    /// Returns `true` once the last byte of the message has been appended.
    /// A message larger than `room` is delivered over several calls.
    fn recv_chunk(
        &mut self,
        buf: &mut BytesMut,
        room: usize,
    ) -> impl Future<Output = Result<bool>> + Send;
}
