use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::error::Result;

/// A connected session socket, readable and writable.
///
/// This is the I/O type handed to the connection layer. In production it
/// wraps a TCP stream over the GPRS bearer; on Unix a socket-pair variant
/// exists for in-process peers.
pub struct NetStream {
    inner: NetStreamInner,
}

enum NetStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for NetStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for NetStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            NetStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl NetStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: NetStreamInner::Tcp(stream),
        }
    }

    /// Wrap one end of a Unix socket pair.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: NetStreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// The connection layer reads from one handle and writes to the other.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Shut down both directions.
    ///
    /// Unblocks a reader parked on any clone of this stream.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            NetStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
            #[cfg(unix)]
            NetStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
        }
    }
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            NetStreamInner::Tcp(stream) => f
                .debug_struct("NetStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            NetStreamInner::Unix(_) => f.debug_struct("NetStream").field("type", &"unix").finish(),
        }
    }
}

/// Opens session sockets to candidate endpoints.
///
/// The connection layer only ever talks to this trait, so tests and
/// alternative bearers can supply their own socket source.
pub trait Dialer: Send + Sync {
    /// Open a connected stream to `endpoint` (blocking).
    fn dial(&self, endpoint: &Endpoint) -> Result<NetStream>;
}

impl<D: Dialer + ?Sized> Dialer for std::sync::Arc<D> {
    fn dial(&self, endpoint: &Endpoint) -> Result<NetStream> {
        (**self).dial(endpoint)
    }
}
