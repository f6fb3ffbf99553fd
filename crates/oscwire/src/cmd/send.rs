use std::time::{Duration, Instant};

use oscwire_codec::{OscArg, OscMessage, Packet};
use oscwire_session::{OscSession, SessionConfig, SessionError, PING_ADDRESS};
use oscwire_transport::StreamTransport;
use tracing::debug;

use crate::cmd::{connect, parse_duration, SendArgs};
use crate::exit::{codec_error, session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat, config: SessionConfig) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let msg = build_message(&args.osc_address, &args.args)?;

    let session = connect(&args.addr, args.unix, config)?;
    session
        .send_packet(&msg)
        .map_err(|err| session_error("send failed", err))?;
    debug!(address = msg.address(), size = msg.size(), "message sent");

    if args.wait {
        let reply =
            wait_for_reply(&session, wait_timeout).map_err(|err| session_error("receive failed", err))?;
        print_message(&reply, session.label(), format);
    }

    session.stop();
    Ok(SUCCESS)
}

/// Build a write-mode message from CLI argument specs.
pub fn build_message(address: &str, specs: &[String]) -> CliResult<OscMessage> {
    if !address.starts_with('/') {
        return Err(CliError::usage(format!(
            "osc address must start with '/': {address}"
        )));
    }
    let mut msg = OscMessage::with_address(address);
    for spec in specs {
        let arg = parse_arg(spec)?;
        msg.push_arg(&arg)
            .map_err(|err| codec_error(&format!("cannot encode argument {spec}"), err))?;
    }
    Ok(msg)
}

/// Parse one `TAG:VALUE` argument, or a bare `T`, `F` or `N`.
pub fn parse_arg(spec: &str) -> CliResult<OscArg> {
    match spec {
        "T" => return Ok(OscArg::Bool(true)),
        "F" => return Ok(OscArg::Bool(false)),
        "N" => return Ok(OscArg::Nil),
        _ => {}
    }

    let (tag, value) = spec
        .split_once(':')
        .ok_or_else(|| CliError::usage(format!("argument must be TAG:VALUE, T, F or N: {spec}")))?;
    let invalid = || CliError::usage(format!("invalid value for '{tag}' argument: {value}"));

    match tag {
        "i" => value.parse().map(OscArg::Int).map_err(|_| invalid()),
        "h" => value.parse().map(OscArg::Long).map_err(|_| invalid()),
        "f" => value.parse().map(OscArg::Float).map_err(|_| invalid()),
        "d" => value.parse().map(OscArg::Double).map_err(|_| invalid()),
        "s" => Ok(OscArg::Str(value.to_string())),
        "b" => parse_hex(value).map(OscArg::Blob).ok_or_else(invalid),
        other => Err(CliError::usage(format!("unsupported argument tag: {other}"))),
    }
}

fn parse_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 || !input.is_ascii() {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&input[i..i + 2], 16).ok())
        .collect()
}

trait ReplySource {
    fn recv_packet(&self, timeout: Duration) -> Result<Packet, SessionError>;
}

impl ReplySource for OscSession<StreamTransport> {
    fn recv_packet(&self, timeout: Duration) -> Result<Packet, SessionError> {
        self.recv_timeout(timeout)
    }
}

/// Wait for the first non-heartbeat message.
fn wait_for_reply<R: ReplySource>(source: &R, timeout: Duration) -> Result<OscMessage, SessionError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SessionError::Timeout(timeout));
        }
        let packet = source.recv_packet(remaining)?;
        match packet.into_message() {
            Some(msg) if msg.address() != PING_ADDRESS => return Ok(msg),
            _ => continue,
        }
    }
}
