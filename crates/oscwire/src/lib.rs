//! Open Sound Control over length-prefixed byte streams.
//!
//! oscwire carries OSC messages over TCP or Unix domain sockets, one packet
//! per frame, with a background worker that keeps the link alive and drops
//! it when the peer goes quiet.
//!
//! # Crate Structure
//!
//! - [`transport`]: non-blocking byte-stream transports (TCP, Unix sockets)
//! - [`codec`]: OSC message encoding and stream framing
//! - [`session`]: heartbeating sessions, inbound queue and address dispatch

/// Re-export transport types.
pub mod transport {
    pub use oscwire_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use oscwire_codec::*;
}

/// Re-export session types.
pub mod session {
    pub use oscwire_session::*;
}

pub use oscwire_codec::{OscArg, OscMessage, Packet};
pub use oscwire_session::{OscSession, SessionConfig};
