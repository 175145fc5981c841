//! Where transports come from.
//!
//! The multiplexer pulls one transport per connection attempt. A source that
//! returns `Ok(None)` is exhausted and ends the multiplexer; an `Err` is one
//! failed attempt and the multiplexer pulls again.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::channel::Transport;
use crate::error::{Error, Result};
use crate::timing::{sleep_or_cancel, TimedScope};

/// A pull-based sequence of transports.
pub trait TransportSource: Send + 'static {
    /// Transport type produced
    type Transport: Transport;

    /// Produce the next transport, `None` once the source is exhausted or
    /// `shutdown` fired.
    fn next_transport(
        &mut self,
        shutdown: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Self::Transport>>> + Send;
}

/// Yields one already-accepted transport, then ends.
pub struct Singleton<T> {
    inner: Option<T>,
}

impl<T> Singleton<T> {
    /// Wrap a single transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Some(transport),
        }
    }
}

impl<T: Transport> TransportSource for Singleton<T> {
    type Transport = T;

    async fn next_transport(&mut self, _shutdown: &CancellationToken) -> Result<Option<T>> {
        Ok(self.inner.take())
    }
}

/// Dials a WebSocket URL on every pull. Never exhausted.
pub struct WsDialer {
    url: String,
    connect_timeout: Duration,
}

impl WsDialer {
    /// Dial `url` (`ws://…`), giving each attempt `connect_timeout`.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

impl TransportSource for WsDialer {
    type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn next_transport(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<Option<Self::Transport>> {
        tracing::debug!("Dialing {}", self.url);

        let scope = TimedScope::new(shutdown, self.connect_timeout);
        let (ws, _response) = scope
            .run(async {
                connect_async_with_config(self.url.as_str(), None, true)
                    .await
                    .map_err(Error::from)
            })
            .await?;

        Ok(Some(ws))
    }
}

/// Waits `delay` before every pull except the first.
///
/// The wait observes shutdown; a cancelled wait ends the sequence.
pub struct RateLimited<S> {
    inner: S,
    delay: Duration,
    first: bool,
}

impl<S> RateLimited<S> {
    /// Wrap `inner`.
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            first: true,
        }
    }
}

impl<S: TransportSource> TransportSource for RateLimited<S> {
    type Transport = S::Transport;

    async fn next_transport(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<Option<S::Transport>> {
        if self.first {
            self.first = false;
        } else if !sleep_or_cancel(shutdown, self.delay).await {
            return Ok(None);
        }

        if shutdown.is_cancelled() {
            return Ok(None);
        }
        self.inner.next_transport(shutdown).await
    }
}
