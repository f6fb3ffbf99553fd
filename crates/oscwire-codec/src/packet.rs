use tracing::warn;

use crate::message::{DecodePolicy, OscMessage};

/// Kinds of OSC packet carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Message,
    Bundle,
}

/// One decoded OSC packet.
///
/// Only messages are decoded. `Bundle` exists so code matching on packets
/// already handles the second OSC packet kind; nothing produces it yet.
#[derive(Debug, Clone)]
pub enum Packet {
    Message(OscMessage),
    Bundle,
}

impl Packet {
    /// Decode one frame payload into a packet.
    ///
    /// Returns `None` when the payload has no well-formed address and tag
    /// string; the caller drops the frame.
    pub fn create_from_buffer(data: &[u8]) -> Option<Packet> {
        Self::create_with_policy(data, DecodePolicy::default())
    }

    /// Decode a frame payload, applying `policy` to the resulting message.
    pub fn create_with_policy(data: &[u8], policy: DecodePolicy) -> Option<Packet> {
        match OscMessage::create_from_buffer(data) {
            Ok(msg) => Some(Packet::Message(msg.with_decode_policy(policy))),
            Err(err) => {
                warn!(len = data.len(), error = %err, "dropping malformed osc packet");
                None
            }
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Message(_) => PacketKind::Message,
            Packet::Bundle => PacketKind::Bundle,
        }
    }

    pub fn as_message(&self) -> Option<&OscMessage> {
        match self {
            Packet::Message(msg) => Some(msg),
            Packet::Bundle => None,
        }
    }

    pub fn into_message(self) -> Option<OscMessage> {
        match self {
            Packet::Message(msg) => Some(msg),
            Packet::Bundle => None,
        }
    }
}

impl From<OscMessage> for Packet {
    fn from(msg: OscMessage) -> Self {
        Packet::Message(msg)
    }
}
