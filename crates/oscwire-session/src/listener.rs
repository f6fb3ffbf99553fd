use std::net::ToSocketAddrs;
#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use oscwire_transport::{OscListener, StreamTransport};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::OscSession;

/// Listens for OSC stream connections and starts a session for each.
pub struct SessionListener {
    listener: OscListener,
    config: SessionConfig,
    next_session_id: AtomicU64,
}

impl SessionListener {
    /// Bind a TCP address.
    pub fn bind_tcp(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        Ok(Self::from_listener(OscListener::bind_tcp(addr)?))
    }

    /// Bind a Unix domain socket path.
    #[cfg(unix)]
    pub fn bind_unix(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_listener(OscListener::bind_unix(path)?))
    }

    pub fn from_listener(listener: OscListener) -> Self {
        Self {
            listener,
            config: SessionConfig::default(),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Config applied to every accepted session.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection and start its session, labelled
    /// `session-N`.
    pub fn accept(&self) -> Result<OscSession<StreamTransport>> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.accept_with_label(&format!("session-{id}"))
    }

    /// Accept the next connection and start its session with an explicit label.
    pub fn accept_with_label(&self, label: &str) -> Result<OscSession<StreamTransport>> {
        let transport = self.listener.accept()?;
        self.start_session(transport, label)
    }

    /// Switch between blocking and polling accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        Ok(self.listener.set_nonblocking(nonblocking)?)
    }

    /// Accept a pending connection if one is queued. Only useful after
    /// `set_nonblocking(true)`.
    pub fn try_accept(&self) -> Result<Option<OscSession<StreamTransport>>> {
        let Some(transport) = self.listener.try_accept()? else {
            return Ok(None);
        };
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.start_session(transport, &format!("session-{id}"))
            .map(Some)
    }

    fn start_session(
        &self,
        transport: StreamTransport,
        label: &str,
    ) -> Result<OscSession<StreamTransport>> {
        let session = OscSession::with_config(transport, self.config.clone()).with_label(label);
        session.start()?;
        Ok(session)
    }

    pub fn local_label(&self) -> String {
        self.listener.local_label()
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn transport_name(&self) -> &'static str {
        self.listener.transport_name()
    }
}
