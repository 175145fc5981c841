//! Scoped, timed cancellation.
//!
//! Every blocking step of the tunnel (reading a socket, sending a frame,
//! dialing, lingering) runs inside a [`TimedScope`]: a child of some parent
//! `CancellationToken` plus its own deadline. Expiry of a scope's deadline
//! fails only the operation it wraps; cancelling the parent fails every
//! scope derived from it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Default idle timeout on socket and channel reads (milliseconds)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 300_000;

/// Default send timeout (milliseconds)
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 10_000;

/// Default connect/handshake/resolve timeout (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default delay between transport attempts (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Default bound on graceful socket shutdown (milliseconds)
pub const DEFAULT_LINGER_DELAY_MS: u64 = 1_000;

/// Durations governing every timed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Longest wait for inbound data on a socket or the channel
    pub idle: Duration,
    /// Longest wait for one send to complete
    pub send: Duration,
    /// Longest wait for a dial, handshake or resolve
    pub connect: Duration,
    /// Pause between consecutive transport attempts
    pub reconnect_delay: Duration,
    /// Bound on a graceful write-half shutdown after a connection is removed
    pub linger: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            send: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
            connect: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            linger: Duration::from_millis(DEFAULT_LINGER_DELAY_MS),
        }
    }
}

impl Timeouts {
    /// Scope for one read.
    pub fn idle_scope(&self, parent: &CancellationToken) -> TimedScope {
        TimedScope::new(parent, self.idle)
    }

    /// Scope for one send.
    pub fn send_scope(&self, parent: &CancellationToken) -> TimedScope {
        TimedScope::new(parent, self.send)
    }

    /// Scope for one dial, handshake or resolve.
    pub fn connect_scope(&self, parent: &CancellationToken) -> TimedScope {
        TimedScope::new(parent, self.connect)
    }
}

/// A child cancellation scope with its own deadline.
///
/// Dropping the scope cancels its token, so anything that cloned the token
/// stops with it.
#[derive(Debug)]
pub struct TimedScope {
    token: CancellationToken,
    deadline: Instant,
    limit: Duration,
}

impl TimedScope {
    /// Derive a scope from `parent` that expires after `limit`.
    pub fn new(parent: &CancellationToken, limit: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + limit,
            limit,
        }
    }

    /// Token cancelled with the parent or when this scope is dropped.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Drive `fut` until it finishes, the deadline passes, or the scope is
    /// cancelled, whichever comes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => {
                Err(Error::Timeout(self.limit.as_millis() as u64))
            }
            result = fut => result,
        }
    }
}

impl Drop for TimedScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Sleep for `delay` unless `token` is cancelled first.
///
/// Returns `false` if the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
