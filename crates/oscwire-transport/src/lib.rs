//! Byte-stream transports for OSC sessions.
//!
//! Provides the [`Transport`] trait consumed by the session layer and a
//! concrete [`StreamTransport`] over:
//! - TCP streams
//! - Unix domain sockets (Linux/macOS)
//!
//! Transports are non-blocking on receive: `Ok(0)` means "no data right now",
//! a closed peer surfaces as [`TransportError::Disconnected`].

pub mod error;
pub mod listener;
pub mod stream;
pub mod transport;

pub use error::{Result, TransportError};
pub use listener::OscListener;
pub use stream::StreamTransport;
pub use transport::Transport;
