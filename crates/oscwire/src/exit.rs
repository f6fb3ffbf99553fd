use std::fmt;
use std::io;

use oscwire_codec::CodecError;
use oscwire_session::SessionError;
use oscwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn codec_error(context: &str, err: CodecError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Codec(err) => codec_error(context, err),
        SessionError::NotConnected | SessionError::ShortWrite { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        SessionError::EmptyPayload => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SessionError::Config(_) | SessionError::Json(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        SessionError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn session_errors_map_to_exit_codes() {
        assert_eq!(
            session_error("x", SessionError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(session_error("x", SessionError::NotConnected).code, TRANSPORT_ERROR);
        assert_eq!(
            session_error("x", SessionError::Config("bad".into())).code,
            USAGE
        );
        assert_eq!(
            session_error("x", SessionError::Codec(CodecError::UnterminatedString)).code,
            DATA_INVALID
        );
    }

    #[test]
    fn refused_connection_is_a_plain_failure() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let cli = session_error("connect failed", SessionError::Transport(err));
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.starts_with("connect failed: "));
    }
}
