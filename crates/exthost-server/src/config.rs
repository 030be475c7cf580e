//! Server configuration and errors.

use std::net::SocketAddr;
use std::time::Duration;

use exthost_settings::ServerSettings;

/// Runtime configuration of the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Outbound queue depth per extension channel.
    pub channel_buffer: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_bytes: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
}

impl ServerConfig {
    /// `host:port`, as handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            ..Self::from(&ServerSettings::default())
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            channel_buffer: settings.channel_buffer.max(1),
            max_message_bytes: settings.max_message_bytes,
            ping_interval: Duration::from_millis(settings.ping_interval_ms.max(1)),
        }
    }
}

/// Errors raised while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Bound, but the local address is unavailable.
    #[error("listener has no local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Address and task handle of a running server.
pub type Listening = (SocketAddr, tokio::task::JoinHandle<()>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn built_from_settings() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 9999,
            channel_buffer: 0,
            max_message_bytes: 1024,
            ping_interval_ms: 500,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9999");
        assert_eq!(cfg.channel_buffer, 1);
        assert_eq!(cfg.max_message_bytes, 1024);
        assert_eq!(cfg.ping_interval, Duration::from_millis(500));
    }

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "1.2.3.4:5".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 1.2.3.4:5: in use");
    }
}
