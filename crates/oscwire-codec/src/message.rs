use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CodecError, Result};

/// Round a field size up to the next multiple of 4 bytes.
///
/// Every OSC field (and both header sections) is padded with this rule.
pub const fn rounded_argument_size(size: usize) -> usize {
    size + ((4 - size % 4) % 4)
}

/// Whether a message is being built or consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Write,
    Read,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Mode::Write => "write",
            Mode::Read => "read",
        }
    }
}

/// What happens to the rest of a message after a field read fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// The first failed read poisons the message; later reads return
    /// [`CodecError::DecodeAborted`].
    #[default]
    FailMessage,
    /// Only the failing read is rejected. Cursors stay where they were and
    /// the caller may try a different field type.
    SkipField,
}

/// A single OSC message: address, type-tag string and packed arguments.
///
/// A message is either written field by field (`Mode::Write`) and then
/// serialized with [`OscMessage::write_to_buffer`], or parsed from the wire
/// with [`OscMessage::create_from_buffer`] and read field by field in the same
/// order (`Mode::Read`).
///
/// Numeric fields are stored little-endian, matching the frame length prefix.
#[derive(Debug, Clone)]
pub struct OscMessage {
    mode: Mode,
    address: String,
    tags: String,
    buffer: BytesMut,
    cursor: usize,
    tag_cursor: usize,
    policy: DecodePolicy,
    failed: bool,
}

impl OscMessage {
    /// Create an empty message.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            address: String::new(),
            tags: String::new(),
            buffer: BytesMut::new(),
            cursor: 0,
            tag_cursor: 0,
            policy: DecodePolicy::default(),
            failed: false,
        }
    }

    /// Create a write-mode message for `address`.
    pub fn with_address(address: impl Into<String>) -> Self {
        let mut msg = Self::new(Mode::Write);
        msg.address = address.into();
        msg
    }

    /// Override the decode policy (builder style).
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_decode_policy(&mut self, policy: DecodePolicy) {
        self.policy = policy;
    }

    pub fn decode_policy(&self) -> DecodePolicy {
        self.policy
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The type-tag string, without the leading comma.
    pub fn tags(&self) -> &str {
        &self.tags
    }

    /// The packed argument bytes.
    pub fn argument_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Byte offset of the field cursor within the argument buffer.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Index of the next tag to read.
    pub fn tag_position(&self) -> usize {
        self.tag_cursor
    }

    /// Tags not yet consumed (read mode).
    pub fn remaining_tags(&self) -> usize {
        self.tags.len() - self.tag_cursor
    }

    /// True once a read failed under [`DecodePolicy::FailMessage`].
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Tag at the read cursor, if any.
    pub fn peek_tag(&self) -> Option<char> {
        self.tags.as_bytes().get(self.tag_cursor).map(|&b| b as char)
    }

    /// Generic field access: writes `data` in write mode, fills `data` in read
    /// mode.
    pub fn serialize(&mut self, tag: char, data: &mut [u8]) -> Result<()> {
        match self.mode {
            Mode::Write => self.write_field(tag, data),
            Mode::Read => self.read_field(tag, data),
        }
    }

    /// Append a field: the tag goes on the tag string, `data` is copied and
    /// zero-padded to a 4-byte boundary.
    pub fn write_field(&mut self, tag: char, data: &[u8]) -> Result<()> {
        self.require_mode(Mode::Write)?;
        if !tag.is_ascii() {
            return Err(CodecError::UnsupportedTag(tag));
        }
        let padded = rounded_argument_size(data.len());

        self.tags.push(tag);
        self.buffer.reserve(padded);
        self.buffer.put_slice(data);
        self.buffer.put_bytes(0, padded - data.len());

        self.cursor += padded;
        self.tag_cursor += 1;
        Ok(())
    }

    /// Read the next field into `out`.
    ///
    /// On failure neither cursor moves.
    pub fn read_field(&mut self, tag: char, out: &mut [u8]) -> Result<()> {
        let start = self.begin_read(tag)?;
        let padded = rounded_argument_size(out.len());
        self.ensure_remaining(padded)?;

        out.copy_from_slice(&self.buffer[start..start + out.len()]);
        self.cursor += padded;
        self.tag_cursor += 1;
        Ok(())
    }

    /// Append a string field (`s`): bytes, one NUL, zero padding.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.require_mode(Mode::Write)?;
        if value.as_bytes().contains(&0) {
            return Err(CodecError::MalformedPacket("string contains an interior NUL"));
        }
        let padded = rounded_argument_size(value.len() + 1);

        self.tags.push('s');
        self.buffer.reserve(padded);
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_bytes(0, padded - value.len());

        self.cursor += padded;
        self.tag_cursor += 1;
        Ok(())
    }

    /// Read a string field (`s`).
    ///
    /// The terminator scan is bounded by the end of the argument buffer.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.begin_read('s')?;
        let Some(len) = self.buffer[start..].iter().position(|&b| b == 0) else {
            return self.fail(CodecError::UnterminatedString);
        };
        let padded = rounded_argument_size(len + 1);
        self.ensure_remaining(padded)?;

        let value = match std::str::from_utf8(&self.buffer[start..start + len]) {
            Ok(value) => value.to_string(),
            Err(_) => return self.fail(CodecError::InvalidUtf8),
        };
        self.cursor += padded;
        self.tag_cursor += 1;
        Ok(value)
    }

    /// Append a blob field (`b`): int32 length, bytes, zero padding.
    pub fn write_blob(&mut self, value: &[u8]) -> Result<()> {
        self.require_mode(Mode::Write)?;
        let len = i32::try_from(value.len()).map_err(|_| CodecError::PayloadTooLarge {
            size: value.len(),
            max: i32::MAX as usize,
        })?;
        let padded = 4 + rounded_argument_size(value.len());

        self.tags.push('b');
        self.buffer.reserve(padded);
        self.buffer.put_i32_le(len);
        self.buffer.put_slice(value);
        self.buffer.put_bytes(0, padded - 4 - value.len());

        self.cursor += padded;
        self.tag_cursor += 1;
        Ok(())
    }

    /// Read a blob field (`b`).
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let start = self.begin_read('b')?;
        self.ensure_remaining(4)?;
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buffer[start..start + 4]);
        let Ok(len) = usize::try_from(i32::from_le_bytes(len_bytes)) else {
            return self.fail(CodecError::MalformedPacket("negative blob length"));
        };
        let padded = 4 + rounded_argument_size(len);
        self.ensure_remaining(padded)?;

        let value = self.buffer[start + 4..start + 4 + len].to_vec();
        self.cursor += padded;
        self.tag_cursor += 1;
        Ok(value)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_field('i', &value.to_le_bytes())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = [0u8; 4];
        self.read_field('i', &mut bytes)?;
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_field('h', &value.to_le_bytes())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = [0u8; 8];
        self.read_field('h', &mut bytes)?;
        Ok(i64::from_le_bytes(bytes))
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_field('f', &value.to_le_bytes())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut bytes = [0u8; 4];
        self.read_field('f', &mut bytes)?;
        Ok(f32::from_le_bytes(bytes))
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_field('d', &value.to_le_bytes())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut bytes = [0u8; 8];
        self.read_field('d', &mut bytes)?;
        Ok(f64::from_le_bytes(bytes))
    }

    /// Booleans carry no argument bytes; the value is the tag (`T` or `F`).
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_field(if value { 'T' } else { 'F' }, &[])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let tag = match self.peek_tag() {
            Some('F') => 'F',
            _ => 'T',
        };
        self.read_field(tag, &mut [])?;
        Ok(tag == 'T')
    }

    pub fn write_nil(&mut self) -> Result<()> {
        self.write_field('N', &[])
    }

    pub fn read_nil(&mut self) -> Result<()> {
        self.read_field('N', &mut [])
    }

    /// Total wire length of this message.
    pub fn size(&self) -> usize {
        rounded_argument_size(self.address.len() + 1)
            + rounded_argument_size(self.tags.len() + 2)
            + self.buffer.len()
    }

    /// Serialize into the OSC wire layout.
    pub fn write_to_buffer(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.size());
        self.encode_into(&mut dst);
        dst.freeze()
    }

    /// Append the wire layout of this message to `dst`.
    ///
    /// ```text
    /// address\0<pad to 4>  ,tags\0<pad to 4>  argument bytes
    /// ```
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.size());

        let address_section = rounded_argument_size(self.address.len() + 1);
        put_padded(dst, self.address.as_bytes(), address_section);

        // The comma is not stored in `tags` but is part of the padded section.
        let tag_section = rounded_argument_size(self.tags.len() + 2);
        dst.put_u8(b',');
        put_padded(dst, self.tags.as_bytes(), tag_section - 1);

        dst.put_slice(&self.buffer);
    }

    /// Parse a message from one OSC packet.
    ///
    /// The address and tag string must both be NUL-terminated (and padded)
    /// within `data`; everything after them is the argument buffer. Scanning
    /// never looks past `data.len()`.
    pub fn create_from_buffer(data: &[u8]) -> Result<Self> {
        let (address, tags_start) = read_header_string(data, 0, HeaderField::Address)?;
        let (tag_field, args_start) = read_header_string(data, tags_start, HeaderField::Tags)?;

        let tags = match tag_field.find(',') {
            Some(idx) => &tag_field[idx + 1..],
            None => tag_field,
        };
        if !tags.is_ascii() {
            return Err(CodecError::MalformedPacket("tag string is not ASCII"));
        }

        let mut msg = Self::new(Mode::Read);
        msg.address = address.to_string();
        msg.tags = tags.to_string();
        msg.buffer = BytesMut::from(&data[args_start..]);
        Ok(msg)
    }

    /// A read-mode copy positioned at the first argument.
    ///
    /// The copy keeps the decode policy but not the cursors or an earlier
    /// failed read, so it can be read from the start in either mode.
    pub fn read_view(&self) -> OscMessage {
        let mut view = Self::new(Mode::Read);
        view.address = self.address.clone();
        view.tags = self.tags.clone();
        view.buffer = self.buffer.clone();
        view.policy = self.policy;
        view
    }

    fn require_mode(&self, mode: Mode) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(CodecError::WrongMode(mode.name()))
        }
    }

    /// Validate the next tag and return the byte cursor where the field starts.
    fn begin_read(&mut self, tag: char) -> Result<usize> {
        self.require_mode(Mode::Read)?;
        if self.failed {
            return Err(CodecError::DecodeAborted);
        }
        match self.peek_tag() {
            None => self.fail(CodecError::TagsExhausted(tag)),
            Some(found) if found != tag => self.fail(CodecError::TagMismatch {
                expected: tag,
                found,
            }),
            Some(_) => Ok(self.cursor),
        }
    }

    fn ensure_remaining(&mut self, needed: usize) -> Result<()> {
        let remaining = self.buffer.len() - self.cursor;
        if needed > remaining {
            return self.fail(CodecError::BufferExhausted { needed, remaining });
        }
        Ok(())
    }

    fn fail<T>(&mut self, err: CodecError) -> Result<T> {
        warn!(address = %self.address, error = %err, "osc field read failed");
        if self.policy == DecodePolicy::FailMessage {
            self.failed = true;
        }
        Err(err)
    }
}

fn put_padded(dst: &mut BytesMut, bytes: &[u8], padded_len: usize) {
    dst.put_slice(bytes);
    dst.put_bytes(0, padded_len - bytes.len());
}

#[derive(Clone, Copy)]
enum HeaderField {
    Address,
    Tags,
}

impl HeaderField {
    fn unterminated(self) -> CodecError {
        CodecError::MalformedPacket(match self {
            HeaderField::Address => "address is not null-terminated",
            HeaderField::Tags => "tag string is not null-terminated",
        })
    }

    fn not_utf8(self) -> CodecError {
        CodecError::MalformedPacket(match self {
            HeaderField::Address => "address is not valid UTF-8",
            HeaderField::Tags => "tag string is not valid UTF-8",
        })
    }

    fn truncated(self) -> CodecError {
        CodecError::MalformedPacket(match self {
            HeaderField::Address => "address padding runs past end of packet",
            HeaderField::Tags => "tag string padding runs past end of packet",
        })
    }
}

/// Read a NUL-terminated, 4-byte padded string starting at `offset`.
///
/// Returns the string and the offset just past its padding. `offset` must not
/// exceed `data.len()`.
fn read_header_string(data: &[u8], offset: usize, field: HeaderField) -> Result<(&str, usize)> {
    let section = &data[offset..];
    let len = section
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| field.unterminated())?;
    let value = std::str::from_utf8(&section[..len]).map_err(|_| field.not_utf8())?;

    let end = offset + rounded_argument_size(len + 1);
    if end > data.len() {
        return Err(field.truncated());
    }
    Ok((value, end))
}
