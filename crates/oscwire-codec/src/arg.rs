use std::fmt;

use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::message::OscMessage;

/// A decoded OSC argument with a known layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OscArg {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Blob(Vec<u8>),
    Bool(bool),
    Nil,
}

impl OscArg {
    /// The type tag this argument is written with.
    pub fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Long(_) => 'h',
            OscArg::Float(_) => 'f',
            OscArg::Double(_) => 'd',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
            OscArg::Nil => 'N',
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Int(v) => write!(f, "{v}"),
            OscArg::Long(v) => write!(f, "{v}"),
            OscArg::Float(v) => write!(f, "{v}"),
            OscArg::Double(v) => write!(f, "{v}"),
            OscArg::Str(v) => write!(f, "{v:?}"),
            OscArg::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            OscArg::Bool(v) => write!(f, "{v}"),
            OscArg::Nil => f.write_str("nil"),
        }
    }
}

impl OscMessage {
    /// Append one typed argument.
    pub fn push_arg(&mut self, arg: &OscArg) -> Result<()> {
        match arg {
            OscArg::Int(v) => self.write_i32(*v),
            OscArg::Long(v) => self.write_i64(*v),
            OscArg::Float(v) => self.write_f32(*v),
            OscArg::Double(v) => self.write_f64(*v),
            OscArg::Str(v) => self.write_string(v),
            OscArg::Blob(v) => self.write_blob(v),
            OscArg::Bool(v) => self.write_bool(*v),
            OscArg::Nil => self.write_nil(),
        }
    }

    /// Read the argument at the cursor, choosing the layout from its tag.
    pub fn read_arg(&mut self) -> Result<OscArg> {
        match self.peek_tag() {
            Some('i') => self.read_i32().map(OscArg::Int),
            Some('h') => self.read_i64().map(OscArg::Long),
            Some('f') => self.read_f32().map(OscArg::Float),
            Some('d') => self.read_f64().map(OscArg::Double),
            Some('s') => self.read_string().map(OscArg::Str),
            Some('b') => self.read_blob().map(OscArg::Blob),
            Some('T') | Some('F') => self.read_bool().map(OscArg::Bool),
            Some('N') => self.read_nil().map(|()| OscArg::Nil),
            Some(other) => Err(CodecError::UnsupportedTag(other)),
            None => Err(CodecError::TagsExhausted('?')),
        }
    }

    /// Decode every argument from the start, without moving this message's
    /// cursors. Works for messages in either mode.
    pub fn arguments(&self) -> Result<Vec<OscArg>> {
        let mut view = self.read_view();
        let mut out = Vec::with_capacity(view.remaining_tags());
        while view.remaining_tags() > 0 {
            out.push(view.read_arg()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_collect_arguments() {
        let args = vec![
            OscArg::Int(3),
            OscArg::Str("volume".to_string()),
            OscArg::Float(0.75),
            OscArg::Blob(vec![9, 8, 7]),
            OscArg::Bool(false),
            OscArg::Nil,
            OscArg::Long(-1),
            OscArg::Double(1.5),
        ];
        let mut msg = OscMessage::with_address("/args");
        for arg in &args {
            msg.push_arg(arg).unwrap();
        }
        assert_eq!(msg.tags(), "isfbFNhd");

        // Works on the write-side message without disturbing it.
        assert_eq!(msg.arguments().unwrap(), args);

        let decoded = OscMessage::create_from_buffer(&msg.write_to_buffer()).unwrap();
        assert_eq!(decoded.arguments().unwrap(), args);
        assert_eq!(decoded.position(), 0);
    }

    #[test]
    fn unknown_tag_stops_argument_walk() {
        let mut msg = OscMessage::with_address("/custom");
        msg.write_i32(1).unwrap();
        msg.write_field('r', &[0, 0, 0, 0]).unwrap();

        let err = msg.arguments().unwrap_err();
        assert_eq!(err, CodecError::UnsupportedTag('r'));
    }

    #[test]
    fn arg_tags_and_display() {
        assert_eq!(OscArg::Bool(true).tag(), 'T');
        assert_eq!(OscArg::Str("x".into()).to_string(), "\"x\"");
        assert_eq!(OscArg::Blob(vec![0; 3]).to_string(), "<blob 3 bytes>");
    }

    #[test]
    fn serializes_as_tagged_json() {
        let json = serde_json::to_value(OscArg::Int(4)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "int", "value": 4 }));
    }
}
