/// Errors that can occur while encoding or decoding OSC messages and frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The next tag in the message does not match the requested field type.
    #[error("requested tag '{expected}' but next tag was '{found}'")]
    TagMismatch { expected: char, found: char },

    /// Every tag in the message has already been read.
    #[error("cannot read tag '{0}', no more tags")]
    TagsExhausted(char),

    /// The argument buffer ends before the requested field.
    #[error("argument buffer exhausted (need {needed} bytes, {remaining} remaining)")]
    BufferExhausted { needed: usize, remaining: usize },

    /// A string argument has no terminator before the end of the buffer.
    #[error("string argument is not null-terminated")]
    UnterminatedString,

    /// A string argument or header is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// The packet header (address or tag string) could not be parsed.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// A previous read failed and the message is configured to abort.
    #[error("message decode aborted after an earlier error")]
    DecodeAborted,

    /// The tag has no known argument layout.
    #[error("unsupported argument tag '{0}'")]
    UnsupportedTag(char),

    /// The field was used against a message in the wrong mode.
    #[error("operation requires a message in {0} mode")]
    WrongMode(&'static str),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
