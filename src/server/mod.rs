//! Tunnel endpoints.
//!
//! A tunnel has two halves:
//!
//! ```text
//!  TCP clients ──▶ TcpEndpoint ══ WebSocket (encrypted) ══▶ WsEndpoint ──▶ TCP target
//!                  (connector,                             (listener,
//!                   dials + redials)                        one mux per socket)
//! ```
//!
//! [`run`] starts whichever half the configuration describes.

mod config;
mod tcp;
mod ws;

pub use config::{ConfigFile, Mode, TunnelConfig};
pub use tcp::TcpEndpoint;
pub use ws::WsEndpoint;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Run the configured endpoint until `shutdown` fires.
///
/// Fails only on startup problems: an unresolvable target or a bind error.
pub async fn run(config: TunnelConfig, shutdown: CancellationToken) -> Result<()> {
    let mux = Arc::new(config.mux);

    match config.mode {
        Mode::TcpToWebSocket { listen, url } => {
            TcpEndpoint::bind(&listen, url, mux)
                .await?
                .run(shutdown)
                .await
        }
        Mode::WebSocketToTcp { listen, target } => {
            let addr = tokio::net::lookup_host(target.as_str())
                .await?
                .next()
                .ok_or_else(|| Error::config(format!("{} did not resolve", target)))?;
            WsEndpoint::bind(&listen, addr, mux)
                .await?
                .run(shutdown)
                .await
        }
    }
}
