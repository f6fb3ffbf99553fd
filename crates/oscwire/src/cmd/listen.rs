use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oscwire_session::{OscSession, SessionConfig, SessionError, SessionListener, PING_ADDRESS};
use oscwire_transport::StreamTransport;
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const RECV_SLICE: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat, config: SessionConfig) -> CliResult<i32> {
    let listener = bind(&args)?.with_config(config);
    listener
        .set_nonblocking(true)
        .map_err(|err| session_error("bind failed", err))?;
    info!(
        addr = %listener.local_label(),
        transport = listener.transport_name(),
        "waiting for osc connections"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let session = match listener.try_accept() {
            Ok(Some(session)) => session,
            Ok(None) => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(session_error("accept failed", err)),
        };
        info!(session = session.label(), "session connected");

        let done = serve(&session, &args, format, &running, &mut printed)?;
        session.stop();
        info!(session = session.label(), "session closed");
        if done {
            break;
        }
    }

    Ok(SUCCESS)
}

fn bind(args: &ListenArgs) -> CliResult<SessionListener> {
    if args.unix {
        return bind_unix(&args.addr);
    }
    SessionListener::bind_tcp(args.addr.as_str()).map_err(|err| session_error("bind failed", err))
}

#[cfg(unix)]
fn bind_unix(path: &str) -> CliResult<SessionListener> {
    SessionListener::bind_unix(path).map_err(|err| session_error("bind failed", err))
}

#[cfg(not(unix))]
fn bind_unix(_path: &str) -> CliResult<SessionListener> {
    Err(CliError::usage("--unix requires a Unix platform"))
}

/// Print messages from one session until it disconnects. Returns `true` once
/// `--count` messages have been printed.
fn serve(
    session: &OscSession<StreamTransport>,
    args: &ListenArgs,
    format: OutputFormat,
    running: &AtomicBool,
    printed: &mut usize,
) -> CliResult<bool> {
    while running.load(Ordering::SeqCst) {
        let packet = match session.recv_timeout(RECV_SLICE) {
            Ok(packet) => packet,
            Err(SessionError::Timeout(_)) => continue,
            Err(SessionError::NotConnected) => return Ok(false),
            Err(err) => return Err(session_error("receive failed", err)),
        };
        let Some(msg) = packet.into_message() else {
            continue;
        };
        if msg.address() == PING_ADDRESS && !args.include_pings {
            continue;
        }

        print_message(&msg, session.label(), format);
        *printed = printed.saturating_add(1);

        if args.echo {
            if let Err(err) = session.send_packet(&msg) {
                warn!(session = session.label(), error = %err, "echo failed");
            }
        }

        if args.count.is_some_and(|count| *printed >= count) {
            return Ok(true);
        }
    }
    Ok(true)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
