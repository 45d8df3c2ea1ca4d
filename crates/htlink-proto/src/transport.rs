// Transport seam
//
// The session never opens sockets itself: it asks a `Connector` for a
// fresh byte stream each time it leaves `Closed`. Production code uses
// `TcpConnector`; tests wrap it to count or delay connections.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::Error;

/// Connection parameters shared by every connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for every single I/O step (open, send, receive).
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens byte streams to the device.
pub trait Connector: Send + Sync + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new connection. Implementations must respect `config.timeout`.
    fn connect(&self, config: &TransportConfig)
    -> impl Future<Output = Result<Self::Io, Error>> + Send;
}

/// Plain TCP (or serial-over-TCP bridge) connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Io = TcpStream;

    async fn connect(&self, config: &TransportConfig) -> Result<TcpStream, Error> {
        let addr = config.addr();
        debug!(%addr, "opening connection");

        let stream = tokio::time::timeout(
            config.timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "connect",
            timeout: config.timeout,
        })?
        .map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_maps_to_connect_error() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TransportConfig::new("127.0.0.1", port);
        let err = TcpConnector.connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
        assert!(err.is_session_fault());
    }

    #[test]
    fn addr_formatting() {
        let config = TransportConfig::new("heatpump.local", 9999);
        assert_eq!(config.addr(), "heatpump.local:9999");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
