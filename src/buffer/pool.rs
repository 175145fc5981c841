//! Fixed-capacity buffer recycling.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;

/// Default number of idle buffers kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 64;

/// A pool of `BytesMut` buffers that all have at least `capacity` bytes.
///
/// Shared as `Arc<BufferPool>` between the endpoint, the multiplexer and
/// every pump. Buffers are handed out as [`PooledBuffer`] guards and go back
/// to the free list when the guard drops.
#[derive(Debug)]
pub struct BufferPool {
    capacity: usize,
    max_idle: usize,
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    /// Create a pool of buffers of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self::with_max_idle(capacity, DEFAULT_MAX_IDLE)
    }

    /// Create a pool that keeps at most `max_idle` buffers around.
    pub fn with_max_idle(capacity: usize, max_idle: usize) -> Self {
        Self {
            capacity,
            max_idle,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Capacity every handed-out buffer is guaranteed to have.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Take an empty buffer from the pool, allocating if none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.capacity));

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        // Split-off or shrunk buffers are not worth keeping
        if buf.capacity() < self.capacity {
            return;
        }
        buf.clear();

        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// A buffer borrowed from a [`BufferPool`].
///
/// Dereferences to `BytesMut`; returned to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
