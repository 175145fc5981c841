//! Opening sockets for connection ids first seen on the channel.

use std::net::SocketAddr;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;

use crate::error::Result;
use crate::protocol::ConnectionId;
use crate::registry::BoxedStream;

/// Produces a socket for an id the registry does not know yet.
pub trait Resolver: Send + Sync + 'static {
    /// Open a new socket on behalf of `id`.
    fn resolve(&self, id: ConnectionId) -> BoxFuture<'_, Result<BoxedStream>>;
}

/// Dials one fixed TCP address for every new id.
#[derive(Debug, Clone)]
pub struct TcpResolver {
    target: SocketAddr,
}

impl TcpResolver {
    /// Resolve every id by connecting to `target`.
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    /// Address dialed.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Resolver for TcpResolver {
    fn resolve(&self, id: ConnectionId) -> BoxFuture<'_, Result<BoxedStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(self.target).await?;
            stream.set_nodelay(true)?;
            tracing::info!("Connection {} opened to {}", id, self.target);
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}
