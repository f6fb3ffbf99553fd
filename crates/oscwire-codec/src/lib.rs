//! OSC message encoding and length-prefixed stream framing.
//!
//! Two layers live here:
//! - [`OscMessage`]: address + type-tag string + 4-byte aligned arguments,
//!   written and read field by field.
//! - Stream framing: every OSC packet travels as a 4-byte little-endian
//!   length followed by the packet bytes. [`FrameAssembler`] rebuilds frames
//!   from a non-blocking stream without ever blocking.
//!
//! [`Packet`] ties them together: one frame payload decodes into one packet.

pub mod arg;
pub mod error;
pub mod frame;
pub mod message;
pub mod packet;

pub use arg::OscArg;
pub use error::{CodecError, Result};
pub use frame::{
    decode_frame, encode_frame, length_prefix, FrameAssembler, FrameStep, Stage,
    DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE,
};
pub use message::{rounded_argument_size, DecodePolicy, Mode, OscMessage};
pub use packet::{Packet, PacketKind};
