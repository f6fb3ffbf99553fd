use std::net::ToSocketAddrs;
#[cfg(unix)]
use std::path::Path;

use oscwire_transport::StreamTransport;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::session::OscSession;

/// Connect to a TCP OSC endpoint and start a session with default settings.
pub fn connect_tcp(
    addr: impl ToSocketAddrs + std::fmt::Debug,
) -> Result<OscSession<StreamTransport>> {
    connect_tcp_with_config(addr, SessionConfig::default())
}

/// Connect over TCP with explicit configuration.
pub fn connect_tcp_with_config(
    addr: impl ToSocketAddrs + std::fmt::Debug,
    config: SessionConfig,
) -> Result<OscSession<StreamTransport>> {
    let transport = StreamTransport::connect_tcp(addr)?;
    start_session(transport, config)
}

/// Connect to a Unix domain socket OSC endpoint with default settings.
#[cfg(unix)]
pub fn connect_unix(path: impl AsRef<Path>) -> Result<OscSession<StreamTransport>> {
    connect_unix_with_config(path, SessionConfig::default())
}

/// Connect over a Unix domain socket with explicit configuration.
#[cfg(unix)]
pub fn connect_unix_with_config(
    path: impl AsRef<Path>,
    config: SessionConfig,
) -> Result<OscSession<StreamTransport>> {
    let transport = StreamTransport::connect_unix(path)?;
    start_session(transport, config)
}

fn start_session(
    transport: StreamTransport,
    config: SessionConfig,
) -> Result<OscSession<StreamTransport>> {
    let label = transport.peer_label();
    let session = OscSession::with_config(transport, config).with_label(label);
    session.start()?;
    Ok(session)
}
