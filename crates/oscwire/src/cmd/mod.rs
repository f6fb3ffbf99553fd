use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use oscwire_session::{OscSession, SessionConfig};
use oscwire_transport::StreamTransport;

use crate::exit::{session_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and print received OSC messages.
    Listen(ListenArgs),
    /// Send a single OSC message.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: SessionConfig) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format, config),
        Command::Send(args) => send::run(args, format, config),
        Command::Version(args) => version::run(args),
    }
}

/// Session settings shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct SessionArgs {
    /// JSON session config file.
    #[arg(long, value_name = "FILE", env = "OSCWIRE_CONFIG", global = true)]
    pub config: Option<PathBuf>,
    /// Heartbeat interval (e.g. 5s, 500ms). Overrides the config file.
    #[arg(long, value_name = "DURATION", global = true)]
    pub heartbeat: Option<String>,
    /// Idle timeout (e.g. 10s, 500ms). Overrides the config file.
    #[arg(long, value_name = "DURATION", global = true)]
    pub idle_timeout: Option<String>,
}

impl SessionArgs {
    pub fn resolve(&self) -> CliResult<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_json_file(path)
                .map_err(|err| session_error("config load failed", err))?,
            None => SessionConfig::default(),
        };
        if let Some(heartbeat) = &self.heartbeat {
            config.heartbeat_interval = parse_duration(heartbeat)?;
        }
        if let Some(timeout) = &self.idle_timeout {
            config.idle_timeout = parse_duration(timeout)?;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// TCP address to bind (e.g. 127.0.0.1:9000), or a socket path with --unix.
    pub addr: String,
    /// Treat ADDR as a Unix domain socket path.
    #[arg(long)]
    pub unix: bool,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Send every received message back to its sender.
    #[arg(long)]
    pub echo: bool,
    /// Also print /ping heartbeats.
    #[arg(long)]
    pub include_pings: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// TCP address to connect to, or a socket path with --unix.
    pub addr: String,
    /// OSC address pattern of the message (e.g. /mixer/gain).
    pub osc_address: String,
    /// Arguments as TAG:VALUE (i:42, h:-7, f:0.5, d:2.5, s:text, b:cafe) or a
    /// bare T, F or N.
    pub args: Vec<String>,
    /// Treat ADDR as a Unix domain socket path.
    #[arg(long)]
    pub unix: bool,
    /// Wait for one reply message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open a started session to `addr`.
pub fn connect(
    addr: &str,
    unix: bool,
    config: SessionConfig,
) -> CliResult<OscSession<StreamTransport>> {
    if unix {
        return connect_unix(addr, config);
    }
    oscwire_session::connect_tcp_with_config(addr, config)
        .map_err(|err| session_error("connect failed", err))
}

#[cfg(unix)]
fn connect_unix(path: &str, config: SessionConfig) -> CliResult<OscSession<StreamTransport>> {
    oscwire_session::connect_unix_with_config(path, config)
        .map_err(|err| session_error("connect failed", err))
}

#[cfg(not(unix))]
fn connect_unix(_path: &str, _config: SessionConfig) -> CliResult<OscSession<StreamTransport>> {
    Err(CliError::usage("--unix requires a Unix platform"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
