//! WebSocket transport over tokio-tungstenite.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::channel::transport::{Transport, TransportSink, TransportStream};
use crate::error::{Error, Result};

impl<S> Transport for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sink = WsSink<S>;
    type Stream = WsStream<S>;

    fn split(self) -> (WsSink<S>, WsStream<S>) {
        let (sink, stream) = StreamExt::split(self);
        (
            WsSink { inner: sink },
            WsStream {
                inner: stream,
                pending: None,
            },
        )
    }
}

/// Sending half of a WebSocket.
pub struct WsSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> TransportSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_message(&mut self, data: &[u8]) -> Result<()> {
        self.inner.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// Receiving half of a WebSocket.
///
/// Holds the unread tail of a message larger than the caller's room.
pub struct WsStream<S> {
    inner: SplitStream<WebSocketStream<S>>,
    pending: Option<Bytes>,
}

impl<S> WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_binary(&mut self) -> Result<Bytes> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Bytes::from(data)),
                Some(Ok(Message::Close(_))) | None => return Err(Error::ChannelClosed),
                Some(Ok(Message::Text(_))) => {
                    return Err(Error::InvalidMessage("unexpected text message".into()))
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

impl<S> TransportStream for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv_chunk(&mut self, buf: &mut BytesMut, room: usize) -> Result<bool> {
        let mut message = match self.pending.take() {
            Some(rest) => rest,
            None => self.next_binary().await?,
        };

        let n = message.len().min(room);
        buf.extend_from_slice(&message.split_to(n));

        if message.is_empty() {
            Ok(true)
        } else {
            self.pending = Some(message);
            Ok(false)
        }
    }
}
