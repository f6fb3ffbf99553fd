//! Address routing with a dispatch map, over an in-process socket pair.
//!
//! Run with:
//!   cargo run --example dispatch-routes

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oscwire::codec::OscMessage;
use oscwire::session::OscSession;
use oscwire::transport::StreamTransport;
use oscwire::SessionConfig;

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = StreamTransport::pair()?;
    let config = SessionConfig::default().with_poll_interval(Duration::from_millis(5));

    let mixer = OscSession::with_config(left, config.clone()).with_label("mixer");
    let surface = OscSession::with_config(right, config).with_label("surface");

    let fader_moves = Arc::new(AtomicU32::new(0));
    {
        let mut routes = mixer.dispatch_map();
        let moves = Arc::clone(&fader_moves);
        routes.register("/fader/*", move |msg| {
            moves.fetch_add(1, Ordering::Relaxed);
            let level = msg.read_f32();
            println!("{} -> {:?}", msg.address(), level);
        });
        routes.register("/transport/play", |_| println!("play"));
        routes.set_fallback(|msg| println!("unrouted: {}", msg.address()));
    }

    mixer.start()?;
    surface.start()?;

    for (address, level) in [("/fader/1", 0.25f32), ("/fader/2", 0.8)] {
        let mut msg = OscMessage::with_address(address);
        msg.write_f32(level)?;
        surface.send_packet(&msg)?;
    }
    surface.send_packet(&OscMessage::with_address("/transport/play"))?;
    surface.send_packet(&OscMessage::with_address("/meter/reset"))?;

    let mut handled = 0;
    while handled < 4 {
        std::thread::sleep(Duration::from_millis(20));
        handled += mixer.dispatch_messages();
    }
    println!("fader moves: {}", fader_moves.load(Ordering::Relaxed));

    surface.stop();
    mixer.stop();
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this example needs Unix domain sockets");
}
