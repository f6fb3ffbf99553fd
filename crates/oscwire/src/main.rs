mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, SessionArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "oscwire", version, about = "Open Sound Control over byte streams")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cli
        .session
        .resolve()
        .and_then(|config| cmd::run(cli.command, format, config));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_arguments() {
        let cli = Cli::try_parse_from([
            "oscwire",
            "send",
            "127.0.0.1:9000",
            "/mixer/gain",
            "f:0.5",
            "i:-1",
            "--wait",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.osc_address, "/mixer/gain");
                assert_eq!(args.args, vec!["f:0.5", "i:-1"]);
                assert!(args.wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_session_overrides() {
        let cli = Cli::try_parse_from([
            "oscwire",
            "listen",
            "127.0.0.1:0",
            "--heartbeat",
            "1s",
            "--idle-timeout",
            "3s",
            "--count",
            "2",
        ])
        .expect("listen args should parse");

        assert_eq!(cli.session.heartbeat.as_deref(), Some("1s"));
        assert_eq!(cli.session.idle_timeout.as_deref(), Some("3s"));
        assert!(matches!(cli.command, Command::Listen(ref args) if args.count == Some(2)));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = Cli::try_parse_from(["oscwire", "--format", "xml", "version"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
