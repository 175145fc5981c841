//! WebSocket-listener endpoint.
//!
//! Each accepted WebSocket gets its own multiplexer and its own registry.
//! Ids first seen on that WebSocket are resolved by dialing the TCP target.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::buffer::BufferPool;
use crate::channel::Singleton;
use crate::error::{Error, Result};
use crate::mux::Multiplexer;
use crate::protocol::Side;
use crate::registry::{Registry, TcpResolver};
use crate::MuxConfig;

/// Accepts WebSockets and opens TCP connections on their behalf.
pub struct WsEndpoint {
    listener: TcpListener,
    target: SocketAddr,
    config: Arc<MuxConfig>,
}

impl WsEndpoint {
    /// Bind `listen`; tunneled connections are opened to `target`.
    pub async fn bind(listen: &str, target: SocketAddr, config: Arc<MuxConfig>) -> Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        Ok(Self {
            listener,
            target,
            config,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` fires, then wait for every multiplexer.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            "Listening for WebSockets on {}, tunneling to {}",
            self.local_addr()?,
            self.target
        );

        let pool = Arc::new(BufferPool::new(self.config.max_message_size));
        let mut peers = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(_) = peers.join_next(), if !peers.is_empty() => continue,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let config = Arc::clone(&self.config);
                    let pool = Arc::clone(&pool);
                    let target = self.target;
                    let shutdown = shutdown.clone();

                    peers.spawn(async move {
                        if let Err(e) =
                            serve_peer(stream, peer_addr, target, config, pool, shutdown).await
                        {
                            tracing::debug!("WebSocket upgrade from {} failed: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                }
            }
        }

        while peers.join_next().await.is_some() {}
        Ok(())
    }
}

async fn serve_peer(
    stream: TcpStream,
    peer_addr: SocketAddr,
    target: SocketAddr,
    config: Arc<MuxConfig>,
    pool: Arc<BufferPool>,
    shutdown: CancellationToken,
) -> Result<()> {
    stream.set_nodelay(true)?;

    let ws = config
        .timeouts
        .connect_scope(&shutdown)
        .run(async {
            tokio_tungstenite::accept_async(stream)
                .await
                .map_err(Error::from)
        })
        .await?;
    tracing::info!("WebSocket from {}", peer_addr);

    let registry = Arc::new(Registry::with_resolver(
        config.timeouts,
        TcpResolver::new(target),
    ));
    let span = tracing::info_span!("peer", addr = %peer_addr);
    let mux = Multiplexer::new(
        Side::Listener,
        config,
        Singleton::new(ws),
        registry,
        pool,
        span,
    );
    mux.run(shutdown).await;
    Ok(())
}
