use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::transport::Transport;

/// Pause between write attempts while the socket buffer is full.
const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// A connected socket in non-blocking mode.
///
/// On every platform this can wrap a TCP stream.
/// On Unix it can also wrap a Unix domain socket stream.
pub struct StreamTransport {
    inner: StreamInner,
    send_timeout: Option<Duration>,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl StreamTransport {
    /// Wrap a connected TCP stream and switch it to non-blocking mode.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: StreamInner::Tcp(stream),
            send_timeout: None,
        })
    }

    /// Wrap a connected Unix stream and switch it to non-blocking mode.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            inner: StreamInner::Unix(stream),
            send_timeout: None,
        })
    }

    /// Connect to a TCP endpoint (blocking connect, non-blocking afterwards).
    pub fn connect_tcp(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let addr_label = format!("{addr:?}");
        let stream = TcpStream::connect(&addr).map_err(|source| TransportError::Connect {
            addr: addr_label.clone(),
            source,
        })?;
        debug!(addr = %addr_label, "connected over tcp");
        Self::from_tcp(stream)
    }

    /// Connect to a listening Unix domain socket.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            TransportError::Connect {
                addr: path.display().to_string(),
                source,
            }
        })?;
        debug!(?path, "connected to unix domain socket");
        Self::from_unix(stream)
    }

    /// Create a connected pair of Unix stream transports.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left)?, Self::from_unix(right)?))
    }

    /// Human readable peer address.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            StreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "unix:unnamed".to_string()),
        }
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
        }
    }

    fn write_raw(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
        }
    }
}

impl Transport for StreamTransport {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.read_raw(buf) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(n),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Writes until `data` is flushed to the socket buffer or the send
    /// timeout passes. On timeout a partial count is returned if anything
    /// went out, otherwise `Io(TimedOut)`.
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let deadline = self.send_timeout.map(|timeout| Instant::now() + timeout);
        let mut offset = 0usize;
        while offset < data.len() {
            match self.write_raw(&data[offset..]) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        if offset > 0 {
                            debug!(written = offset, expected = data.len(), "send timed out");
                            return Ok(offset);
                        }
                        return Err(TransportError::Io(ErrorKind::TimedOut.into()));
                    }
                    std::thread::sleep(SEND_RETRY_INTERVAL);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(offset)
    }

    fn set_send_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.send_timeout = timeout;
        Ok(())
    }

    fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            StreamInner::Tcp(stream) => StreamInner::Tcp(stream.try_clone()?),
            #[cfg(unix)]
            StreamInner::Unix(stream) => StreamInner::Unix(stream.try_clone()?),
        };
        Ok(Self {
            inner,
            send_timeout: self.send_timeout,
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        let result = match &self.inner {
            StreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            // Already closed by the peer.
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn transport_name(&self) -> &'static str {
        match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
        }
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("type", &self.transport_name())
            .finish()
    }
}
