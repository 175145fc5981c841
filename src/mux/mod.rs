//! Multiplexer: the reconnect state machine.
//!
//! ```text
//!            ┌──────────────── pull next transport ◀──────────────┐
//!            ▼                                                    │
//!  Disconnected ──▶ Connecting ──handshake ok──▶ Active ──fails──▶┤
//!            │           │                                        │
//!            │           └──────── handshake failed ──────────────┘
//!            └── source exhausted / shutdown ──▶ Terminated
//! ```
//!
//! While `Active`, the receive pump and the pump set run under one child
//! scope of the shutdown token. Whichever ends first cancels that scope;
//! then both are awaited, every registered connection is dropped and the
//! channel is closed before the next transport is pulled.

mod pump;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::buffer::BufferPool;
use crate::channel::{Channel, RateLimited, TransportSource};
use crate::error::Error;
use crate::protocol::Side;
use crate::registry::Registry;
use crate::MuxConfig;

use pump::{pump_set, receive_pump, Link};

/// Observable multiplexer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    /// No channel; about to pull a transport
    Disconnected,
    /// Pulling a transport or running the handshake
    Connecting,
    /// Channel established, pumps running
    Active,
    /// Source exhausted or shutdown requested; the loop has ended
    Terminated,
}

/// Tunnels every connection of one registry over a sequence of channels.
pub struct Multiplexer<S: TransportSource> {
    side: Side,
    config: Arc<MuxConfig>,
    source: RateLimited<S>,
    registry: Arc<Registry>,
    pool: Arc<BufferPool>,
    span: tracing::Span,
    state: watch::Sender<MuxState>,
}

impl<S: TransportSource> Multiplexer<S> {
    /// Create a multiplexer. Nothing runs until [`Multiplexer::run`].
    ///
    /// `source` is rate limited by the configured reconnect delay. Spawned
    /// pumps are instrumented with `span`.
    pub fn new(
        side: Side,
        config: Arc<MuxConfig>,
        source: S,
        registry: Arc<Registry>,
        pool: Arc<BufferPool>,
        span: tracing::Span,
    ) -> Self {
        let source = RateLimited::new(source, config.timeouts.reconnect_delay);
        let (state, _) = watch::channel(MuxState::Disconnected);
        Self {
            side,
            config,
            source,
            registry,
            pool,
            span,
            state,
        }
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MuxState> {
        self.state.subscribe()
    }

    /// Run until the source is exhausted or `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut attempt: u64 = 0;

        while !shutdown.is_cancelled() {
            self.set_state(MuxState::Connecting);

            let transport = match self.source.next_transport(&shutdown).await {
                Ok(Some(transport)) => transport,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Transport attempt failed: {}", e);
                    self.registry.reset();
                    self.set_state(MuxState::Disconnected);
                    continue;
                }
            };
            attempt += 1;
            tracing::info!("Connecting as {} (attempt {})", self.side, attempt);

            match Channel::establish(self.side, &self.config, transport, &shutdown).await {
                Ok(channel) => {
                    tracing::info!("Channel active");
                    self.set_state(MuxState::Active);
                    self.serve(Arc::new(channel), &shutdown).await;
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        tracing::warn!("Channel handshake failed: {}", e);
                    }
                    self.registry.reset();
                }
            }

            self.set_state(MuxState::Disconnected);
        }

        self.registry.reset();
        self.set_state(MuxState::Terminated);
        tracing::info!("Multiplexer terminated");
    }

    async fn serve<T>(&self, channel: Arc<Channel<T>>, shutdown: &CancellationToken)
    where
        T: crate::channel::Transport,
    {
        let link = Arc::new(Link {
            channel: Arc::clone(&channel),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            pool: Arc::clone(&self.pool),
            scope: shutdown.child_token(),
            span: self.span.clone(),
        });

        let receive = receive_pump(Arc::clone(&link));
        let pumps = pump_set(Arc::clone(&link));
        tokio::pin!(receive);
        tokio::pin!(pumps);

        let ended = tokio::select! {
            result = &mut receive => {
                link.scope.cancel();
                let _ = pumps.await;
                result
            }
            result = &mut pumps => {
                link.scope.cancel();
                let _ = (&mut receive).await;
                result
            }
        };

        match ended {
            Err(Error::Cancelled) | Ok(()) if shutdown.is_cancelled() => {
                tracing::info!("Channel stopped for shutdown")
            }
            Err(Error::Cancelled) | Ok(()) => tracing::info!("Channel stopped"),
            Err(e) => tracing::info!("Channel lost: {}", e),
        }

        self.registry.reset();
        channel.close().await;
    }

    fn set_state(&self, state: MuxState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Multiplexer {:?} -> {:?}", previous, state);
        }
    }
}
