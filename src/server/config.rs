//! Tunnel configuration.
//!
//! The binary reads a JSON [`ConfigFile`] and converts it with
//! [`ConfigFile::to_config`] into a validated [`TunnelConfig`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::PresharedKey;
use crate::error::{Error, Result};
use crate::protocol::FRAME_SUFFIX_SIZE;
use crate::MuxConfig;

/// Which way traffic enters the tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Accept TCP on `listen` and tunnel it through a WebSocket dialed at `url`
    TcpToWebSocket {
        /// `host:port` to bind
        listen: String,
        /// `ws://` URL of the far end
        url: String,
    },
    /// Accept WebSockets on `listen` and open a TCP connection to `target`
    /// for every tunneled connection
    WebSocketToTcp {
        /// `host:port` to bind
        listen: String,
        /// `host:port` dialed per connection
        target: String,
    },
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Endpoint layout
    pub mode: Mode,
    /// Key, limits and timeouts handed to every multiplexer
    pub mux: MuxConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: Option<String>,
}

impl TunnelConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.mux.key.is_empty() {
            return Err(Error::config("key cannot be empty"));
        }
        if self.mux.kdf_iterations == 0 {
            return Err(Error::config("kdf_iterations must be positive"));
        }
        if self.mux.max_message_size <= FRAME_SUFFIX_SIZE {
            return Err(Error::config(format!(
                "max_message_size must exceed {} bytes",
                FRAME_SUFFIX_SIZE
            )));
        }

        let t = &self.mux.timeouts;
        for (name, value) in [
            ("idle_timeout_ms", t.idle),
            ("send_timeout_ms", t.send),
            ("connect_timeout_ms", t.connect),
            ("reconnect_delay_ms", t.reconnect_delay),
            ("linger_delay_ms", t.linger),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Configuration file format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// `tcp://host:port` or `ws://host:port`; host `+` binds every interface
    pub listen_on: String,
    /// `ws://…` URL when listening on TCP, `tcp://host:port` when listening
    /// on WebSocket
    pub tunnel_to: String,
    /// Pre-shared key
    pub key: String,
    /// PBKDF2 iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_iterations: Option<u32>,
    /// Idle timeout (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
    /// Send timeout (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
    /// Connect timeout (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Delay between connection attempts (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,
    /// Bound on graceful socket shutdown (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linger_delay_ms: Option<u64>,
    /// Largest channel message (bytes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<usize>,
    /// Log filter, e.g. `info` or `wsmux=debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Read and parse a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Parse JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(format!("invalid JSON: {}", e)))
    }

    /// Convert to a validated runtime configuration.
    pub fn to_config(&self) -> Result<TunnelConfig> {
        let listen = Address::parse(&self.listen_on)?;
        let tunnel = Address::parse(&self.tunnel_to)?;

        let mode = match (listen.scheme, tunnel.scheme) {
            (Scheme::Tcp, Scheme::Ws) => Mode::TcpToWebSocket {
                listen: listen.bind_addr(),
                url: self.tunnel_to.clone(),
            },
            (Scheme::Ws, Scheme::Tcp) => Mode::WebSocketToTcp {
                listen: listen.bind_addr(),
                target: tunnel.host_port(),
            },
            _ => {
                return Err(Error::config(format!(
                    "cannot tunnel {} to {}: one end must be tcp:// and the other ws://",
                    self.listen_on, self.tunnel_to
                )))
            }
        };

        let mut mux = MuxConfig::new(PresharedKey::new(&self.key));
        if let Some(iterations) = self.kdf_iterations {
            mux.kdf_iterations = iterations;
        }
        if let Some(size) = self.max_message_size {
            mux.max_message_size = size;
        }

        let t = &mut mux.timeouts;
        let millis = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };
        t.idle = millis(self.idle_timeout_ms, t.idle);
        t.send = millis(self.send_timeout_ms, t.send);
        t.connect = millis(self.connect_timeout_ms, t.connect);
        t.reconnect_delay = millis(self.reconnect_delay_ms, t.reconnect_delay);
        t.linger = millis(self.linger_delay_ms, t.linger);

        let config = TunnelConfig {
            mode,
            mux,
            log_level: self.log_level.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Tcp,
    Ws,
}

/// `scheme://host:port[/path]`
#[derive(Debug)]
struct Address {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Address {
    fn parse(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| Error::config(format!("{}: missing scheme", s)))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "tcp" => Scheme::Tcp,
            "ws" => Scheme::Ws,
            other => return Err(Error::config(format!("{}: unsupported scheme {}", s, other))),
        };

        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| Error::config(format!("{}: missing port", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::config(format!("{}: invalid port {}", s, port)))?;
        if host.is_empty() {
            return Err(Error::config(format!("{}: missing host", s)));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn bind_addr(&self) -> String {
        match self.host.as_str() {
            "+" | "*" => format!("0.0.0.0:{}", self.port),
            _ => self.host_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(listen_on: &str, tunnel_to: &str) -> ConfigFile {
        ConfigFile {
            listen_on: listen_on.into(),
            tunnel_to: tunnel_to.into(),
            key: "secret".into(),
            kdf_iterations: None,
            idle_timeout_ms: None,
            send_timeout_ms: None,
            connect_timeout_ms: None,
            reconnect_delay_ms: None,
            linger_delay_ms: None,
            max_message_size: None,
            log_level: None,
        }
    }

    #[test]
    fn test_tcp_listener_config() {
        let config = file("tcp://+:8080", "ws://relay.example:9000/tunnel")
            .to_config()
            .unwrap();
        assert_eq!(
            config.mode,
            Mode::TcpToWebSocket {
                listen: "0.0.0.0:8080".into(),
                url: "ws://relay.example:9000/tunnel".into(),
            }
        );
        assert_eq!(config.mux.kdf_iterations, 100_000);
    }

    #[test]
    fn test_websocket_listener_config() {
        let config = file("ws://127.0.0.1:9000/", "tcp://db.internal:5432")
            .to_config()
            .unwrap();
        assert_eq!(
            config.mode,
            Mode::WebSocketToTcp {
                listen: "127.0.0.1:9000".into(),
                target: "db.internal:5432".into(),
            }
        );
    }

    #[test]
    fn test_parse_overrides() {
        let json = r#"{
            "listen_on": "tcp://+:1",
            "tunnel_to": "ws://h:2",
            "key": "k",
            "kdf_iterations": 10,
            "idle_timeout_ms": 1500,
            "reconnect_delay_ms": 250,
            "max_message_size": 4096,
            "log_level": "debug"
        }"#;
        let config = ConfigFile::parse(json).unwrap().to_config().unwrap();

        assert_eq!(config.mux.kdf_iterations, 10);
        assert_eq!(config.mux.max_message_size, 4096);
        assert_eq!(config.mux.timeouts.idle, Duration::from_millis(1500));
        assert_eq!(config.mux.timeouts.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_validation() {
        let mut bad = file("tcp://+:1", "ws://h:2");
        bad.key.clear();
        assert!(bad.to_config().is_err());

        let mut bad = file("tcp://+:1", "ws://h:2");
        bad.send_timeout_ms = Some(0);
        assert!(bad.to_config().is_err());

        let mut bad = file("tcp://+:1", "ws://h:2");
        bad.max_message_size = Some(FRAME_SUFFIX_SIZE);
        assert!(bad.to_config().is_err());

        assert!(file("tcp://+:1", "tcp://h:2").to_config().is_err());
        assert!(file("http://+:1", "ws://h:2").to_config().is_err());
        assert!(file("tcp://+", "ws://h:2").to_config().is_err());
        assert!(file("tcp://+:99999", "ws://h:2").to_config().is_err());
        assert!(ConfigFile::parse(r#"{"listen_on": "tcp://+:1"}"#).is_err());
    }
}
