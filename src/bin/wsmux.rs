//! wsmux binary
//!
//! Usage: wsmux <config.json>
//!
//! Runs one tunnel endpoint until Ctrl-C.

use std::env;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use wsmux::server::{self, ConfigFile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(path) = env::args().nth(1) else {
        print_usage();
        anyhow::bail!("missing configuration file");
    };
    if path == "-h" || path == "--help" {
        print_usage();
        return Ok(());
    }

    let config = ConfigFile::load(&path)
        .and_then(|file| file.to_config())
        .with_context(|| format!("loading {}", path))?;

    // RUST_LOG wins over the configured level
    let default_level = config.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    server::run(config, shutdown).await.context("tunnel endpoint failed")?;
    Ok(())
}

fn print_usage() {
    eprintln!(
        r#"wsmux - TCP over encrypted WebSocket multiplexer

USAGE:
    wsmux <config.json>

CONFIG:
    {{
      "listen_on": "tcp://+:8080",        tcp:// or ws://, host + = any
      "tunnel_to": "ws://relay:9000/",    the other scheme
      "key": "pre-shared secret",
      "reconnect_delay_ms": 5000,         optional timeouts, limits, log_level
      ...
    }}

Set RUST_LOG to override the log level."#
    );
}
