//! The three pumps that run while a channel is active.
//!
//! - the receive pump moves channel frames into sockets,
//! - one connection pump per socket moves socket bytes into channel frames,
//! - the pump set keeps exactly one connection pump per registered socket.
//!
//! All of them stop when the link scope is cancelled. Socket trouble only
//! ever removes that socket; channel trouble cancels the scope.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::buffer::BufferPool;
use crate::channel::{Channel, Transport};
use crate::error::{Error, Result};
use crate::protocol::ConnectionId;
use crate::registry::{Connection, Registry};
use crate::MuxConfig;

/// How long reconciliation waits for a pump whose connection disappeared.
pub(crate) const RECONCILE_GRACE: Duration = Duration::from_millis(1);

/// Everything the pumps of one active channel share.
pub(crate) struct Link<T: Transport> {
    pub channel: Arc<Channel<T>>,
    pub registry: Arc<Registry>,
    pub config: Arc<MuxConfig>,
    pub pool: Arc<BufferPool>,
    pub scope: CancellationToken,
    pub span: tracing::Span,
}

impl<T: Transport> Link<T> {
    /// Send one frame under the send timeout. Any failure is channel-level
    /// and cancels the scope.
    async fn send_frame(&self, buf: &mut BytesMut, id: ConnectionId) -> Result<()> {
        let result = self
            .config
            .timeouts
            .send_scope(&self.scope)
            .run(self.channel.send(buf, id))
            .await;

        if let Err(e) = &result {
            if !e.is_cancelled() {
                tracing::warn!("Channel send for connection {} failed: {}", id, e);
            }
            self.scope.cancel();
        }
        result
    }
}

/// Channel → sockets.
///
/// Returns only with an error: the channel failed, went idle, or the scope
/// was cancelled.
pub(crate) async fn receive_pump<T: Transport>(link: Arc<Link<T>>) -> Result<()> {
    let mut buf = link.pool.acquire();

    loop {
        let id = link
            .config
            .timeouts
            .idle_scope(&link.scope)
            .run(link.channel.receive(&mut buf))
            .await?;

        if buf.is_empty() {
            tracing::debug!("Peer closed connection {}", id);
            link.registry.remove(id);
            continue;
        }

        let conn = match link.registry.get(id, &link.scope).await {
            Ok(conn) => conn,
            Err(_) if link.scope.is_cancelled() => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!("Dropping {} bytes: {}", buf.len(), e);
                continue;
            }
        };

        tracing::trace!("{} bytes for connection {}", buf.len(), id);
        let written = link
            .config
            .timeouts
            .send_scope(&link.scope)
            .run(conn.write_all(&buf))
            .await;

        if let Err(e) = written {
            if link.scope.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tracing::warn!("Write to connection {} failed: {}", id, e);
            link.registry.remove(id);
        }
    }
}

/// Socket → channel for one connection.
///
/// Returns `Err` only when the channel itself failed.
pub(crate) async fn connection_pump<T: Transport>(
    link: Arc<Link<T>>,
    conn: Arc<Connection>,
) -> Result<()> {
    let id = conn.id();
    let Some(mut reader) = conn.take_reader() else {
        return Ok(());
    };
    let mut buf = link.pool.acquire();
    let limit = link.channel.max_payload();

    loop {
        buf.clear();

        // Connection cancellation interrupts the read only, never a send
        let read = {
            let mut room = (&mut *buf).limit(limit);
            let idle = link.config.timeouts.idle_scope(conn.token());
            let socket_read = async { reader.read_buf(&mut room).await.map_err(Error::from) };
            tokio::select! {
                biased;
                _ = link.scope.cancelled() => return Ok(()),
                read = idle.run(socket_read) => read,
            }
        };

        match read {
            Ok(0) => {
                tracing::debug!("Connection {} reached EOF", id);
                link.send_frame(&mut buf, id).await?;
                link.registry.remove(id);
                return Ok(());
            }
            Ok(n) => {
                tracing::trace!("{} bytes from connection {}", n, id);
                link.send_frame(&mut buf, id).await?;
            }
            Err(_) if conn.is_cancelled() => return Ok(()),
            Err(e) => {
                tracing::warn!("Connection {} failed: {}", id, e);
                buf.clear();
                // Best effort: the peer learns the connection is gone
                let _ = link.send_frame(&mut buf, id).await;
                link.registry.remove(id);
                return Ok(());
            }
        }
    }
}

/// Keeps one connection pump per registered connection until the scope ends.
///
/// Only the pumps hold connections strongly; the set remembers which
/// connection a pump serves through a `Weak`, so a removed connection is
/// released as soon as its pump returns.
pub(crate) async fn pump_set<T: Transport>(link: Arc<Link<T>>) -> Result<()> {
    let mut tasks: HashMap<ConnectionId, (Weak<Connection>, JoinHandle<Result<()>>)> =
        HashMap::new();
    let mut retired: Vec<JoinHandle<Result<()>>> = Vec::new();

    loop {
        let snapshot = link.registry.snapshot();

        for (id, conn) in snapshot.connections.iter() {
            let fresh = match tasks.get(id) {
                None => true,
                Some((known, _)) => !std::ptr::eq(known.as_ptr(), Arc::as_ptr(conn)),
            };
            if fresh {
                let pump = connection_pump(Arc::clone(&link), Arc::clone(conn));
                let handle = tokio::spawn(pump.instrument(link.span.clone()));
                if let Some((_, old)) = tasks.insert(*id, (Arc::downgrade(conn), handle)) {
                    retired.push(old);
                }
            }
        }

        let stale: Vec<ConnectionId> = tasks
            .keys()
            .filter(|id| !snapshot.connections.contains_key(*id))
            .copied()
            .collect();
        for id in stale {
            let finished = match tasks.get_mut(&id) {
                Some((_, handle)) => {
                    handle.is_finished()
                        || tokio::time::timeout(RECONCILE_GRACE, handle).await.is_ok()
                }
                None => false,
            };
            if finished {
                tasks.remove(&id);
            }
        }
        retired.retain(|handle| !handle.is_finished());

        tokio::select! {
            _ = snapshot.changed.cancelled() => {}
            _ = link.scope.cancelled() => break,
        }
    }

    for (_, (_, handle)) in tasks.drain() {
        let _ = handle.await;
    }
    for handle in retired {
        let _ = handle.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::{self, test_config, MemorySink, MemoryStream, MemoryTransport};
    use crate::channel::TransportSink;
    use crate::protocol::Side;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::Semaphore;

    /// Memory transport whose sends each need a permit from `gate`.
    struct Gated {
        inner: MemoryTransport,
        gate: Arc<Semaphore>,
    }

    struct GatedSink {
        inner: MemorySink,
        gate: Arc<Semaphore>,
    }

    impl Transport for Gated {
        type Sink = GatedSink;
        type Stream = MemoryStream;

        fn split(self) -> (GatedSink, MemoryStream) {
            let (inner, stream) = self.inner.split();
            (
                GatedSink {
                    inner,
                    gate: self.gate,
                },
                stream,
            )
        }
    }

    impl TransportSink for GatedSink {
        async fn send_message(&mut self, data: &[u8]) -> Result<()> {
            self.gate
                .acquire()
                .await
                .map_err(|_| Error::ChannelClosed)?
                .forget();
            self.inner.send_message(data).await
        }

        async fn close(&mut self) -> Result<()> {
            self.inner.close().await
        }
    }

    struct Fixture {
        link: Arc<Link<Gated>>,
        peer: Channel<MemoryTransport>,
        gate: Arc<Semaphore>,
    }

    /// A connector-side link whose sends are gated, plus its listener peer.
    /// The gate starts with one permit for the handshake.
    async fn fixture() -> Fixture {
        let config = Arc::new(test_config("pump test"));
        let gate = Arc::new(Semaphore::new(1));
        let (a, b) = memory::pair(64);
        let root = CancellationToken::new();

        let gated = Gated {
            inner: a,
            gate: Arc::clone(&gate),
        };
        let (ours, peer) = tokio::join!(
            Channel::establish(Side::Connector, &config, gated, &root),
            Channel::establish(Side::Listener, &config, b, &root),
        );

        let link = Arc::new(Link {
            channel: Arc::new(ours.unwrap()),
            registry: Arc::new(Registry::new(config.timeouts)),
            pool: Arc::new(BufferPool::new(config.max_message_size)),
            config,
            scope: CancellationToken::new(),
            span: tracing::Span::none(),
        });
        Fixture {
            link,
            peer: peer.unwrap(),
            gate,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_removed_connection_released_after_slow_pump_returns() {
        let Fixture { link, peer, gate } = fixture().await;
        let registry = Arc::clone(&link.registry);
        let set = tokio::spawn(pump_set(Arc::clone(&link)));

        let (local, mut remote) = tokio::io::duplex(1024);
        let id = registry.insert(Box::new(local));
        let weak = Arc::downgrade(&registry.snapshot().connections[&id]);

        // The pump reads this and parks in the gated send
        remote.write_all(b"stuck").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.remove(id);
        tokio::time::sleep(RECONCILE_GRACE * 20).await;
        assert!(weak.upgrade().is_some(), "pump still owns the connection");

        gate.add_permits(1);
        let mut buf = BytesMut::new();
        assert_eq!(peer.receive(&mut buf).await.unwrap(), id);
        assert_eq!(&buf[..], b"stuck");

        // No further registry change is needed to let go of it
        wait_until(|| weak.upgrade().is_none()).await;

        link.scope.cancel();
        set.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_one_pump_per_add_and_fresh_pump_for_reused_id() {
        let Fixture { link, peer, gate } = fixture().await;
        gate.add_permits(64);
        let registry = Arc::clone(&link.registry);
        let set = tokio::spawn(pump_set(Arc::clone(&link)));

        let id = ConnectionId::new(7).unwrap();
        let (local, mut first) = tokio::io::duplex(1024);
        registry.add(id, Box::new(local)).unwrap();

        // Unrelated churn wakes the set without spawning a second pump
        let mut far_ends = Vec::new();
        for _ in 0..3 {
            let (near, far) = tokio::io::duplex(64);
            far_ends.push(far);
            let other = registry.insert(Box::new(near));
            registry.remove(other);
        }
        first.write_all(b"one").await.unwrap();
        let mut buf = BytesMut::new();
        assert_eq!(peer.receive(&mut buf).await.unwrap(), id);
        assert_eq!(&buf[..], b"one");

        // Same id, new socket: served by a new pump
        registry.remove(id);
        let mut rest = Vec::new();
        assert_eq!(first.read_to_end(&mut rest).await.unwrap(), 0);
        let (local, mut second) = tokio::io::duplex(1024);
        registry.add(id, Box::new(local)).unwrap();

        second.write_all(b"two").await.unwrap();
        assert_eq!(peer.receive(&mut buf).await.unwrap(), id);
        assert_eq!(&buf[..], b"two");

        link.scope.cancel();
        set.await.unwrap().unwrap();
    }
}
