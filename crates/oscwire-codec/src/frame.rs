use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};

/// Frame header: little-endian payload length.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default initial scratch buffer size for frame assembly.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Encode the length prefix for a payload of `len` bytes.
pub fn length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    let len = u32::try_from(len).map_err(|_| CodecError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })?;
    Ok(len.to_le_bytes())
}

/// Encode one frame into the stream wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────┐
/// │ Length       │ OSC packet           │
/// │ (4B LE)      │ (Length bytes)       │
/// └──────────────┴──────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let prefix = length_prefix(payload.len())?;
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_slice(&prefix);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
    let payload_len = u32::from_le_bytes(prefix) as usize;

    if payload_len > max_payload {
        return Err(CodecError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < LENGTH_PREFIX_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Where the assembler is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Collecting the 4-byte length prefix.
    AwaitingLength,
    /// Collecting `len` payload bytes.
    AwaitingPayload { len: usize },
    /// Skipping an oversized payload so the stream stays in sync.
    Discarding { remaining: usize },
}

/// Result of feeding bytes to a [`FrameAssembler`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameStep<'a> {
    /// More bytes are needed.
    Pending,
    /// A complete payload is available.
    Complete(&'a [u8]),
    /// The length prefix exceeded the payload limit; that many bytes will be
    /// skipped.
    Oversized(usize),
    /// An oversized payload has been fully skipped.
    Discarded,
}

/// Incremental frame assembly over a non-blocking stream.
///
/// The caller reads into [`FrameAssembler::wanted`], which is exactly the
/// bytes still missing for the current stage, then reports how many arrived
/// with [`FrameAssembler::advance`]. The scratch buffer only ever grows.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    stage: Stage,
    filled: usize,
    max_payload: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_PAYLOAD)
    }
}

impl FrameAssembler {
    pub fn new(initial_capacity: usize, max_payload: usize) -> Self {
        Self {
            buf: vec![0u8; initial_capacity.max(LENGTH_PREFIX_SIZE)],
            stage: Stage::AwaitingLength,
            filled: 0,
            max_payload,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current scratch buffer size.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The slice to read into next.
    pub fn wanted(&mut self) -> &mut [u8] {
        match self.stage {
            Stage::AwaitingLength => &mut self.buf[self.filled..LENGTH_PREFIX_SIZE],
            Stage::AwaitingPayload { len } => &mut self.buf[self.filled..len],
            Stage::Discarding { remaining } => {
                let chunk = remaining.min(self.buf.len());
                &mut self.buf[..chunk]
            }
        }
    }

    /// Record that `n` bytes were read into [`FrameAssembler::wanted`].
    pub fn advance(&mut self, n: usize) -> FrameStep<'_> {
        match self.stage {
            Stage::AwaitingLength => {
                self.filled += n;
                if self.filled < LENGTH_PREFIX_SIZE {
                    return FrameStep::Pending;
                }
                self.filled = 0;

                let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
                prefix.copy_from_slice(&self.buf[..LENGTH_PREFIX_SIZE]);
                let len = u32::from_le_bytes(prefix) as usize;

                if len > self.max_payload {
                    self.stage = Stage::Discarding { remaining: len };
                    return FrameStep::Oversized(len);
                }
                if len == 0 {
                    return FrameStep::Complete(&[]);
                }
                if len > self.buf.len() {
                    self.buf.resize(len, 0);
                }
                self.stage = Stage::AwaitingPayload { len };
                FrameStep::Pending
            }
            Stage::AwaitingPayload { len } => {
                self.filled += n;
                if self.filled < len {
                    return FrameStep::Pending;
                }
                self.filled = 0;
                self.stage = Stage::AwaitingLength;
                FrameStep::Complete(&self.buf[..len])
            }
            Stage::Discarding { remaining } => {
                let remaining = remaining.saturating_sub(n);
                if remaining > 0 {
                    self.stage = Stage::Discarding { remaining };
                    return FrameStep::Pending;
                }
                self.stage = Stage::AwaitingLength;
                FrameStep::Discarded
            }
        }
    }
}
