//! TCP-listener endpoint.
//!
//! Every accepted socket joins one long-lived registry; a single
//! multiplexer dials the far WebSocket again and again and carries them all.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::buffer::BufferPool;
use crate::channel::WsDialer;
use crate::error::Result;
use crate::mux::Multiplexer;
use crate::protocol::Side;
use crate::registry::Registry;
use crate::MuxConfig;

/// Accepts TCP and tunnels it through a dialed WebSocket.
pub struct TcpEndpoint {
    listener: TcpListener,
    url: String,
    config: Arc<MuxConfig>,
}

impl TcpEndpoint {
    /// Bind `listen`. Nothing is dialed until [`TcpEndpoint::run`].
    pub async fn bind(listen: &str, url: impl Into<String>, config: Arc<MuxConfig>) -> Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Self {
            listener,
            url: url.into(),
            config,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` fires, then wait for the multiplexer.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            "Listening for TCP on {}, tunneling to {}",
            self.local_addr()?,
            self.url
        );

        let registry = Arc::new(Registry::new(self.config.timeouts));
        let pool = Arc::new(BufferPool::new(self.config.max_message_size));
        let dialer = WsDialer::new(self.url.clone(), self.config.timeouts.connect);
        let span = tracing::info_span!("tunnel", to = %self.url);

        let mux = Multiplexer::new(
            Side::Connector,
            Arc::clone(&self.config),
            dialer,
            Arc::clone(&registry),
            pool,
            span,
        );
        let mux_task = tokio::spawn(mux.run(shutdown.clone()));

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("set_nodelay failed for {}: {}", peer_addr, e);
                    }
                    let id = registry.insert(Box::new(stream));
                    tracing::debug!("Connection {} from {}", id, peer_addr);
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }

        if let Err(e) = mux_task.await {
            tracing::warn!("Multiplexer task failed: {}", e);
        }
        Ok(())
    }
}
