//! Buffer management for channel and socket I/O.
//!
//! Buffers are large (one maximum channel message each) and churn on every
//! frame, so they are recycled through a [`BufferPool`]. A [`Frame`] views a
//! buffer as a payload followed by a fixed-size trailing suffix, which is how
//! the codec appends connection ids and authentication tags in place.

mod frame;
mod pool;

pub use frame::Frame;
pub use pool::{BufferPool, PooledBuffer};
