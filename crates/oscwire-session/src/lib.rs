//! Heartbeating OSC sessions over length-prefixed byte streams.
//!
//! An [`OscSession`] owns one connected [`oscwire_transport::Transport`].
//! Its worker thread rebuilds frames from the stream, decodes them into
//! packets, keeps the link alive with `/ping` heartbeats, and drops the
//! connection after a period of inbound silence. Decoded messages wait in a
//! queue until [`OscSession::dispatch_messages`] hands them to a
//! [`Dispatch`] implementation, by default an address-keyed [`DispatchMap`].

pub mod clock;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    SessionConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_IDLE_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_SEND_TIMEOUT,
};
#[cfg(unix)]
pub use connector::{connect_unix, connect_unix_with_config};
pub use connector::{connect_tcp, connect_tcp_with_config};
pub use dispatch::{Dispatch, DispatchMap, Handler};
pub use error::{Result, SessionError};
pub use listener::SessionListener;
pub use session::{OscSession, SessionState, PING_ADDRESS};
