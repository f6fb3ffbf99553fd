use std::net::{TcpListener, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
#[cfg(unix)]
use std::os::unix::net::UnixListener;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::StreamTransport;

/// Accepts incoming OSC stream connections.
///
/// Accepted streams are returned as non-blocking [`StreamTransport`]s, ready
/// to be handed to a session.
pub struct OscListener {
    inner: ListenerInner,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocketPath),
}

#[cfg(unix)]
struct UnixSocketPath {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl OscListener {
    /// Default permission mode for created socket paths.
    #[cfg(unix)]
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(all(unix, not(target_os = "linux")))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a TCP address.
    pub fn bind_tcp(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let addr_label = format!("{addr:?}");
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: addr_label,
            source,
        })?;
        info!(addr = %listener.local_addr()?, "listening on tcp");
        Ok(Self {
            inner: ListenerInner::Tcp(listener),
        })
    }

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the path already exists and is a socket, it is removed first
    /// (stale socket cleanup). Any other file type is left alone.
    #[cfg(unix)]
    pub fn bind_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            addr: path.display().to_string(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            inner: ListenerInner::Unix(UnixSocketPath {
                listener,
                created_inode: Some((created.dev(), created.ino())),
                path,
            }),
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<StreamTransport> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().map_err(TransportError::Accept)?;
                debug!(%addr, "accepted tcp connection");
                StreamTransport::from_tcp(stream)
            }
            #[cfg(unix)]
            ListenerInner::Unix(socket) => {
                let (stream, _addr) = socket.listener.accept().map_err(TransportError::Accept)?;
                debug!(path = ?socket.path, "accepted unix connection");
                StreamTransport::from_unix(stream)
            }
        }
    }

    /// Switch between blocking and polling accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            ListenerInner::Tcp(listener) => listener.set_nonblocking(nonblocking)?,
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.listener.set_nonblocking(nonblocking)?,
        }
        Ok(())
    }

    /// Accept a pending connection, or `None` if a non-blocking listener has
    /// nothing queued.
    pub fn try_accept(&self) -> Result<Option<StreamTransport>> {
        match self.accept() {
            Ok(transport) => Ok(Some(transport)),
            Err(TransportError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Address this listener is bound to, for display.
    pub fn local_label(&self) -> String {
        match &self.inner {
            ListenerInner::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.path.display().to_string(),
        }
    }

    /// Bound TCP address, if this is a TCP listener.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.inner {
            ListenerInner::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerInner::Unix(_) => None,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            ListenerInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            ListenerInner::Unix(_) => "unix-domain-socket",
        }
    }
}

#[cfg(unix)]
impl Drop for UnixSocketPath {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}
