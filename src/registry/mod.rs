//! Connection registry.
//!
//! Maps connection ids to live sockets and tells interested parties when the
//! set changes. The map is copy-on-write: readers take a cheap snapshot
//! (an `Arc` clone under a short lock) together with a token that is
//! cancelled on the next mutation, so a reconciler can wait for change
//! without holding any lock.

mod connection;
mod resolver;

pub use connection::{BoxedStream, Connection, DuplexStream};
pub use resolver::{Resolver, TcpResolver};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::ConnectionId;
use crate::timing::Timeouts;

/// Id → connection map shared by snapshots.
pub type ConnectionMap = HashMap<ConnectionId, Arc<Connection>>;

/// A point-in-time view of the registry.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Connections live when the snapshot was taken
    pub connections: Arc<ConnectionMap>,
    /// Cancelled the next time the set of connections changes
    pub changed: CancellationToken,
}

struct Inner {
    map: Arc<ConnectionMap>,
    changed: CancellationToken,
}

impl Inner {
    fn notify(&mut self) {
        let previous = std::mem::replace(&mut self.changed, CancellationToken::new());
        previous.cancel();
    }
}

/// Concurrent registry of tunneled connections.
pub struct Registry {
    inner: Mutex<Inner>,
    resolver: Option<Box<dyn Resolver>>,
    timeouts: Timeouts,
}

impl Registry {
    /// A registry that only knows connections added to it.
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: Arc::new(HashMap::new()),
                changed: CancellationToken::new(),
            }),
            resolver: None,
            timeouts,
        }
    }

    /// A registry that opens sockets for unknown ids through `resolver`.
    pub fn with_resolver(timeouts: Timeouts, resolver: impl Resolver) -> Self {
        Self {
            resolver: Some(Box::new(resolver)),
            ..Self::new(timeouts)
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().map.contains_key(&id)
    }

    /// Register `stream` under `id`. Fails if `id` is already live.
    pub fn add(&self, id: ConnectionId, stream: BoxedStream) -> Result<Arc<Connection>> {
        let mut inner = self.inner.lock();
        if inner.map.contains_key(&id) {
            return Err(Error::InvalidState(format!(
                "connection {} already registered",
                id
            )));
        }

        let conn = Arc::new(Connection::new(id, stream));
        Arc::make_mut(&mut inner.map).insert(id, Arc::clone(&conn));
        inner.notify();
        drop(inner);

        tracing::debug!("Connection {} added", id);
        Ok(conn)
    }

    /// Register a freshly accepted socket under a new random id.
    pub fn insert(&self, stream: BoxedStream) -> ConnectionId {
        let mut inner = self.inner.lock();
        let mut id = ConnectionId::random();
        while inner.map.contains_key(&id) {
            id = ConnectionId::random();
        }

        let conn = Arc::new(Connection::new(id, stream));
        Arc::make_mut(&mut inner.map).insert(id, conn);
        inner.notify();
        drop(inner);

        tracing::info!("Connection {} accepted", id);
        id
    }

    /// Look `id` up, resolving and registering it if unknown.
    ///
    /// Resolution runs under the connect timeout, scoped to `scope`.
    pub async fn get(
        &self,
        id: ConnectionId,
        scope: &CancellationToken,
    ) -> Result<Arc<Connection>> {
        let existing = self.inner.lock().map.get(&id).cloned();
        if let Some(conn) = existing {
            return Ok(conn);
        }

        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| Error::resolve(id, "unknown connection"))?;

        let stream = self
            .timeouts
            .connect_scope(scope)
            .run(resolver.resolve(id))
            .await
            .map_err(|e| Error::resolve(id, e.to_string()))?;

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.map.get(&id) {
            return Ok(Arc::clone(existing));
        }
        let conn = Arc::new(Connection::new(id, stream));
        Arc::make_mut(&mut inner.map).insert(id, Arc::clone(&conn));
        inner.notify();
        Ok(conn)
    }

    /// Deregister and cancel `id`, lingering briefly for a graceful shutdown.
    ///
    /// Returns `false` if `id` was not live.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            if !inner.map.contains_key(&id) {
                return false;
            }
            let removed = Arc::make_mut(&mut inner.map).remove(&id);
            inner.notify();
            removed
        };

        if let Some(conn) = removed {
            conn.cancel();
            let linger = self.timeouts.linger;
            tokio::spawn(async move { conn.shutdown(linger).await });
            tracing::info!("Connection {} closed", id);
        }
        true
    }

    /// Cancel and drop every connection.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = std::mem::take(&mut inner.map);
            inner.notify();
            previous
        };

        for conn in previous.values() {
            conn.cancel();
        }
        if !previous.is_empty() {
            tracing::info!("Dropped {} connections", previous.len());
        }
    }

    /// Current connections plus a token fired on the next change.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            connections: Arc::clone(&inner.map),
            changed: inner.changed.clone(),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("connections", &self.len())
            .field("resolving", &self.resolver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn stream() -> BoxedStream {
        Box::new(tokio::io::duplex(64).0)
    }

    struct DuplexResolver {
        calls: Arc<AtomicUsize>,
    }

    impl Resolver for DuplexResolver {
        fn resolve(&self, _id: ConnectionId) -> BoxFuture<'_, Result<BoxedStream>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(stream()) })
        }
    }

    struct HangingResolver;

    impl Resolver for HangingResolver {
        fn resolve(&self, _id: ConnectionId) -> BoxFuture<'_, Result<BoxedStream>> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let registry = Registry::new(Timeouts::default());
        let root = CancellationToken::new();
        let id = ConnectionId::new(10).unwrap();

        registry.add(id, stream()).unwrap();
        assert!(registry.add(id, stream()).is_err());
        assert_eq!(registry.get(id, &root).await.unwrap().id(), id);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_without_resolver() {
        let registry = Registry::new(Timeouts::default());
        let root = CancellationToken::new();

        let err = registry.get(ConnectionId::new(1).unwrap(), &root).await.unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }

    #[tokio::test]
    async fn test_get_resolves_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Registry::with_resolver(
            Timeouts::default(),
            DuplexResolver {
                calls: Arc::clone(&calls),
            },
        );
        let root = CancellationToken::new();
        let id = ConnectionId::new(77).unwrap();

        let first = registry.get(id, &root).await.unwrap();
        let second = registry.get(id, &root).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.contains(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_times_out() {
        let registry = Registry::with_resolver(Timeouts::default(), HangingResolver);
        let root = CancellationToken::new();

        let err = registry.get(ConnectionId::new(5).unwrap(), &root).await.unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_insert_assigns_unique_ids() {
        let registry = Registry::new(Timeouts::default());
        let ids: std::collections::HashSet<_> =
            (0..100).map(|_| registry.insert(stream())).collect();
        assert_eq!(ids.len(), 100);
        assert_eq!(registry.len(), 100);
    }

    #[tokio::test]
    async fn test_snapshot_token_fires_on_change() {
        let registry = Registry::new(Timeouts::default());
        let before = registry.snapshot();
        assert!(before.connections.is_empty());
        assert!(!before.changed.is_cancelled());

        let id = registry.insert(stream());
        assert!(before.changed.is_cancelled());
        // Copy-on-write: the old view is untouched
        assert!(before.connections.is_empty());

        let after = registry.snapshot();
        assert!(after.connections.contains_key(&id));
        assert!(!after.changed.is_cancelled());

        registry.remove(id);
        assert!(after.changed.is_cancelled());
    }

    #[tokio::test]
    async fn test_reset_cancels_everything() {
        let registry = Registry::new(Timeouts::default());
        let a = registry.insert(stream());
        let b = registry.insert(stream());
        let snap = registry.snapshot();

        registry.reset();
        assert!(registry.is_empty());
        assert!(snap.changed.is_cancelled());
        assert!(snap.connections[&a].is_cancelled());
        assert!(snap.connections[&b].is_cancelled());
    }

    #[tokio::test]
    async fn test_remove_cancels_and_shuts_down() {
        let registry = Registry::new(Timeouts::default());
        let (local, mut remote) = tokio::io::duplex(64);
        let id = registry.insert(Box::new(local));
        let conn = registry.snapshot().connections[&id].clone();

        registry.remove(id);
        assert!(conn.is_cancelled());

        let mut buf = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(2), remote.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
