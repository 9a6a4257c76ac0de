use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::traits::{Dialer, NetStream};

/// TCP dialer for the GPRS bearer.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
    nodelay: bool,
}

impl TcpDialer {
    /// Default bound on a single TCP connect. GPRS session setup is slow.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a dialer with default settings.
    pub fn new() -> Self {
        Self {
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }

    /// Override the per-address connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY` on dialed sockets.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialer for TcpDialer {
    fn dial(&self, endpoint: &Endpoint) -> Result<NetStream> {
        let addrs = (endpoint.host(), endpoint.port())
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    if let Err(err) = stream.set_nodelay(self.nodelay) {
                        warn!(%endpoint, error = %err, "could not set TCP_NODELAY");
                    }
                    debug!(%endpoint, %addr, "connected");
                    return Ok(NetStream::from_tcp(stream));
                }
                Err(err) => {
                    debug!(%endpoint, %addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "endpoint resolved to no addresses",
                )
            }),
        })
    }
}
