/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] oscwire_transport::TransportError),

    /// Encoding or framing error.
    #[error("codec error: {0}")]
    Codec(#[from] oscwire_codec::CodecError),

    /// The session is not running.
    #[error("session is not connected")]
    NotConnected,

    /// Zero-length payloads are never put on the wire.
    #[error("refusing to send an empty payload")]
    EmptyPayload,

    /// The transport accepted fewer bytes than requested.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// `start` was called on a running session.
    #[error("session is already running")]
    AlreadyRunning,

    /// `start` was called on a session that has already stopped.
    #[error("session has stopped and cannot be restarted")]
    AlreadyStopped,

    /// The worker could not be started.
    #[error("failed to start session worker: {0}")]
    Spawn(String),

    /// Configuration could not be loaded.
    #[error("invalid session config: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Waiting for a message timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, SessionError>;
