//! Minimal OSC echo server: accepts one TCP connection and sends every
//! message back until the peer goes quiet.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:9000 /hello s:world --wait

use std::time::Duration;

use oscwire::session::{SessionError, SessionListener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = SessionListener::bind_tcp("127.0.0.1:9000")?;
    eprintln!("Listening on {}", listener.local_label());

    let session = listener.accept()?;
    eprintln!("Peer connected: {}", session.label());

    loop {
        match session.recv_timeout(Duration::from_secs(1)) {
            Ok(packet) => {
                let Some(msg) = packet.into_message() else {
                    continue;
                };
                if msg.address() == oscwire::session::PING_ADDRESS {
                    continue;
                }
                eprintln!("Received {} ({} bytes)", msg.address(), msg.size());
                session.send_packet(&msg)?;
            }
            Err(SessionError::Timeout(_)) => continue,
            Err(e) => {
                eprintln!("Peer disconnected: {e}");
                break;
            }
        }
    }

    Ok(())
}
