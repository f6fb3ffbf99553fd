use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use oscwire_codec::{length_prefix, FrameAssembler, FrameStep, OscMessage, Packet};
use oscwire_transport::Transport;
use tracing::{debug, error, info_span, trace, warn};

use crate::clock::{duration_to_nanos, Clock, SystemClock};
use crate::config::SessionConfig;
use crate::dispatch::{Dispatch, DispatchMap};
use crate::error::{Result, SessionError};

/// Address of the heartbeat message sent when the outbound side goes quiet.
pub const PING_ADDRESS: &str = "/ping";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, worker not started.
    Idle,
    /// Worker running; sends are accepted.
    Running,
    /// Worker exited and the transport was released. Terminal.
    Stopped,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Idle,
            1 => SessionState::Running,
            _ => SessionState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Running => 1,
            SessionState::Stopped => 2,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session handle and its worker thread.
struct Shared<T> {
    /// Write half. Holding this lock is the send lock.
    writer: Mutex<Option<T>>,
    /// Decoded packets in arrival order. Holding this lock is the receive lock.
    inbound: Mutex<VecDeque<Packet>>,
    state: AtomicU8,
    exit_requested: AtomicBool,
    /// Last inbound bytes, in clock nanoseconds.
    last_activity: AtomicU64,
    /// Last successful outbound frame, in clock nanoseconds.
    last_outbound: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> Shared<T> {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn now_nanos(&self) -> u64 {
        duration_to_nanos(self.clock.now())
    }

    fn since(&self, stamp: &AtomicU64, now: u64) -> Duration {
        Duration::from_nanos(now.saturating_sub(stamp.load(Ordering::SeqCst)))
    }

    /// Write one length-prefixed frame under the send lock.
    fn send_frame(&self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(SessionError::EmptyPayload);
        }
        let mut writer = lock(&self.writer);
        self.write_frame(&mut writer, payload)
    }

    /// Like [`Shared::send_frame`], but returns `None` without writing when
    /// another thread holds the send lock.
    fn try_send_frame(&self, payload: &[u8]) -> Option<Result<()>> {
        let mut writer = match self.writer.try_lock() {
            Ok(writer) => writer,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(self.write_frame(&mut writer, payload))
    }

    fn write_frame(&self, writer: &mut Option<T>, payload: &[u8]) -> Result<()> {
        let prefix = length_prefix(payload.len())?;
        if self.state() != SessionState::Running {
            return Err(SessionError::NotConnected);
        }
        let transport = writer.as_mut().ok_or(SessionError::NotConnected)?;

        write_exact(transport, &prefix)?;
        write_exact(transport, payload)?;

        self.last_outbound.store(self.now_nanos(), Ordering::SeqCst);
        trace!(len = payload.len(), "sent frame");
        Ok(())
    }

    fn enqueue(&self, packet: Packet) {
        let mut inbound = lock(&self.inbound);
        inbound.push_back(packet);
        trace!(pending = inbound.len(), "queued inbound packet");
    }

    /// Drop the write half, shutting the stream down first.
    fn release_transport(&self) {
        let transport = lock(&self.writer).take();
        if let Some(mut transport) = transport {
            if let Err(err) = transport.shutdown() {
                debug!(error = %err, "transport shutdown failed");
            }
        }
    }
}

fn write_exact<T: Transport>(transport: &mut T, data: &[u8]) -> Result<()> {
    let written = transport.send(data)?;
    if written != data.len() {
        return Err(SessionError::ShortWrite {
            written,
            expected: data.len(),
        });
    }
    Ok(())
}

/// A running OSC connection over one byte-stream transport.
///
/// Once started, a worker thread assembles inbound frames into a queue,
/// sends a `/ping` heartbeat whenever nothing has been sent for
/// `heartbeat_interval`, and disconnects after `idle_timeout` of inbound
/// silence. Callers send with [`OscSession::send_packet`] and drain the queue
/// through the dispatcher with [`OscSession::dispatch_messages`]. Every method
/// takes `&self`, so a session can be shared across threads behind an `Arc`.
///
/// ```no_run
/// use oscwire_codec::OscMessage;
/// use oscwire_session::OscSession;
/// use oscwire_transport::StreamTransport;
///
/// let transport = StreamTransport::connect_tcp("127.0.0.1:9000")?;
/// let session = OscSession::new(transport);
/// session.dispatch_map().register("/status", |msg| {
///     println!("status: {:?}", msg.read_string());
/// });
/// session.start()?;
///
/// let mut msg = OscMessage::with_address("/mixer/gain");
/// msg.write_f32(0.5)?;
/// session.send_packet(&msg)?;
/// session.dispatch_messages();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct OscSession<T: Transport, D: Dispatch = DispatchMap> {
    shared: Arc<Shared<T>>,
    dispatch: Mutex<D>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: SessionConfig,
    label: String,
}

impl<T: Transport> OscSession<T, DispatchMap> {
    /// Wrap a connected transport with default settings.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self::with_parts(
            transport,
            config,
            DispatchMap::new(),
            Arc::new(SystemClock::new()),
        )
    }

    /// Register handlers here before or after `start`.
    ///
    /// Do not call this from inside a handler; the dispatcher is locked while
    /// handlers run.
    pub fn dispatch_map(&self) -> MutexGuard<'_, DispatchMap> {
        lock(&self.dispatch)
    }
}

impl<T: Transport, D: Dispatch> OscSession<T, D> {
    /// Build a session with an explicit dispatcher and time source.
    pub fn with_parts(
        transport: T,
        config: SessionConfig,
        dispatch: D,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer: Mutex::new(Some(transport)),
                inbound: Mutex::new(VecDeque::new()),
                state: AtomicU8::new(SessionState::Idle.as_u8()),
                exit_requested: AtomicBool::new(false),
                last_activity: AtomicU64::new(0),
                last_outbound: AtomicU64::new(0),
                clock,
            }),
            dispatch: Mutex::new(dispatch),
            worker: Mutex::new(None),
            config,
            label: "session".to_string(),
        }
    }

    /// Name used in this session's log spans and worker thread.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start the worker.
    ///
    /// Fails if the session is already running, has stopped, or the worker
    /// could not be set up. On failure the session stays idle.
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        match self.shared.state() {
            SessionState::Running => return Err(SessionError::AlreadyRunning),
            SessionState::Stopped => return Err(SessionError::AlreadyStopped),
            SessionState::Idle => {}
        }
        self.config.validate()?;

        let reader = {
            let mut writer = lock(&self.shared.writer);
            let transport = writer.as_mut().ok_or(SessionError::AlreadyStopped)?;
            transport.set_send_timeout(Some(self.config.send_timeout))?;
            transport
                .try_clone()
                .map_err(|e| SessionError::Spawn(format!("cannot clone transport: {e}")))?
        };

        let now = self.shared.now_nanos();
        self.shared.last_activity.store(now, Ordering::SeqCst);
        self.shared.last_outbound.store(now, Ordering::SeqCst);
        self.shared.exit_requested.store(false, Ordering::SeqCst);
        self.shared.set_state(SessionState::Running);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let label = self.label.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("osc-{}", self.label))
            .spawn(move || run_worker(shared, reader, config, label));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                debug!(session = %self.label, "session started");
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(SessionState::Idle);
                Err(SessionError::Spawn(err.to_string()))
            }
        }
    }

    /// Stop the worker and release the transport.
    ///
    /// Blocks until the worker has exited, which takes at most one poll
    /// interval. Safe to call on a session that never started or already
    /// stopped; afterwards the session is always [`SessionState::Stopped`].
    pub fn stop(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            self.shared.exit_requested.store(true, Ordering::SeqCst);
            let waited = Instant::now();
            if handle.join().is_err() {
                warn!(session = %self.label, "session worker panicked");
            }
            debug!(session = %self.label, elapsed = ?waited.elapsed(), "session worker joined");
        }
        self.shared.release_transport();
        self.shared.set_state(SessionState::Stopped);
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True while the worker is running.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == SessionState::Running
    }

    /// Encode and send one message.
    pub fn send_packet(&self, msg: &OscMessage) -> Result<()> {
        self.send_packet_data(&msg.write_to_buffer())
    }

    /// Send one pre-encoded packet as a single frame.
    ///
    /// The length prefix and payload are written back to back under the send
    /// lock, so concurrent senders never interleave.
    pub fn send_packet_data(&self, payload: &[u8]) -> Result<()> {
        self.shared.send_frame(payload).inspect_err(|err| match err {
            SessionError::NotConnected | SessionError::EmptyPayload => {
                debug!(session = %self.label, error = %err, "packet not sent");
            }
            _ => error!(
                session = %self.label,
                len = payload.len(),
                error = %err,
                "failed to send packet"
            ),
        })
    }

    /// Deliver every queued message to the dispatcher, in arrival order.
    ///
    /// The receive lock is held for the whole drain, so the worker waits to
    /// enqueue until handlers finish. Returns how many messages were handed
    /// over; bundles are skipped.
    pub fn dispatch_messages(&self) -> usize {
        let mut inbound = lock(&self.shared.inbound);
        if inbound.is_empty() {
            return 0;
        }
        let mut dispatch = lock(&self.dispatch);

        let mut delivered = 0usize;
        for packet in inbound.drain(..) {
            match packet {
                Packet::Message(msg) => {
                    dispatch.dispatch_message(&msg);
                    delivered += 1;
                }
                Packet::Bundle => trace!(session = %self.label, "skipping osc bundle"),
            }
        }
        delivered
    }

    /// Take the oldest queued packet without dispatching it.
    pub fn try_recv(&self) -> Option<Packet> {
        lock(&self.shared.inbound).pop_front()
    }

    /// Poll for a queued packet until `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Packet> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.try_recv() {
                return Ok(packet);
            }
            if !self.is_connected() {
                return Err(SessionError::NotConnected);
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout(timeout));
            }
            std::thread::sleep(self.config.poll_interval.min(Duration::from_millis(10)));
        }
    }

    /// Number of packets waiting to be dispatched.
    pub fn pending(&self) -> usize {
        lock(&self.shared.inbound).len()
    }

    /// Clock time of the last inbound bytes.
    pub fn last_activity(&self) -> Duration {
        Duration::from_nanos(self.shared.last_activity.load(Ordering::SeqCst))
    }

    /// Clock time of the last frame sent, heartbeats included.
    pub fn last_outbound(&self) -> Duration {
        Duration::from_nanos(self.shared.last_outbound.load(Ordering::SeqCst))
    }
}

impl<T: Transport, D: Dispatch> Drop for OscSession<T, D> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: Transport, D: Dispatch> std::fmt::Debug for OscSession<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscSession")
            .field("label", &self.label)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_worker<T: Transport>(
    shared: Arc<Shared<T>>,
    mut reader: T,
    config: SessionConfig,
    label: String,
) {
    let _span = info_span!("osc_session", session = %label).entered();
    debug!(transport = reader.transport_name(), "session worker running");

    let mut assembler = FrameAssembler::new(config.initial_buffer_capacity, config.max_payload_size);
    let ping = OscMessage::with_address(PING_ADDRESS).write_to_buffer();
    let mut read_error_reported = false;

    while !shared.exit_requested.load(Ordering::SeqCst) {
        // Read failures count as "no data"; a dead peer ends in the idle timeout.
        let received = match reader.receive(assembler.wanted()) {
            Ok(n) => n,
            Err(err) => {
                if !read_error_reported {
                    debug!(error = %err, "receive failed; waiting for idle timeout");
                    read_error_reported = true;
                }
                0
            }
        };

        if received > 0 {
            shared.last_activity.store(shared.now_nanos(), Ordering::SeqCst);
            match assembler.advance(received) {
                FrameStep::Complete(payload) => {
                    trace!(len = payload.len(), "frame received");
                    if let Some(packet) = Packet::create_with_policy(payload, config.decode_policy) {
                        shared.enqueue(packet);
                    }
                }
                FrameStep::Oversized(len) => {
                    warn!(len, max = config.max_payload_size, "skipping oversized frame");
                }
                FrameStep::Discarded => trace!("oversized frame skipped"),
                FrameStep::Pending => {}
            }
        } else {
            let now = shared.now_nanos();

            // A busy send lock means a frame is going out; never wait on it here.
            if shared.since(&shared.last_outbound, now) >= config.heartbeat_interval {
                match shared.try_send_frame(&ping) {
                    Some(Ok(())) => trace!("heartbeat sent"),
                    Some(Err(err)) => debug!(error = %err, "heartbeat failed"),
                    None => trace!("send in progress; heartbeat skipped"),
                }
                shared.last_outbound.store(now, Ordering::SeqCst);
            }

            let silent = shared.since(&shared.last_activity, now);
            if silent >= config.idle_timeout {
                error!(silent = ?silent, timeout = ?config.idle_timeout, "connection timed out");
                shared.exit_requested.store(true, Ordering::SeqCst);
            }
        }

        if shared.exit_requested.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(config.poll_interval);
    }

    // Unblocks a sender stalled on a full socket buffer before the send lock
    // is taken for release.
    if let Err(err) = reader.shutdown() {
        debug!(error = %err, "reader shutdown failed");
    }
    drop(reader);
    shared.release_transport();
    shared.set_state(SessionState::Stopped);
    debug!("session worker exited");
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use oscwire_codec::{decode_frame, encode_frame, DecodePolicy, DEFAULT_MAX_PAYLOAD};
    use oscwire_transport::TransportError;

    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct MockState {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
        closed: bool,
        shut_down: bool,
        refuse_clone: bool,
        short_writes: bool,
    }

    /// In-memory transport; clones share the same buffers.
    #[derive(Clone, Default)]
    struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        fn push_frame(&self, payload: &[u8]) {
            let mut wire = BytesMut::new();
            encode_frame(payload, &mut wire).unwrap();
            self.state.lock().unwrap().inbound.extend(wire.iter().copied());
        }

        fn push_message(&self, msg: &OscMessage) {
            self.push_frame(&msg.write_to_buffer());
        }

        fn sent_payloads(&self) -> Vec<Vec<u8>> {
            let mut wire = BytesMut::from(&self.state.lock().unwrap().outbound[..]);
            let mut out = Vec::new();
            while let Some(payload) = decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap() {
                out.push(payload.to_vec());
            }
            assert!(wire.is_empty(), "outbound stream ends mid-frame");
            out
        }

        fn sent_addresses(&self) -> Vec<String> {
            self.sent_payloads()
                .iter()
                .map(|p| OscMessage::create_from_buffer(p).unwrap().address().to_string())
                .collect()
        }

        fn ping_count(&self) -> usize {
            self.sent_addresses().iter().filter(|a| *a == PING_ADDRESS).count()
        }

        fn shut_down(&self) -> bool {
            self.state.lock().unwrap().shut_down
        }
    }

    impl Transport for MockTransport {
        fn receive(&mut self, buf: &mut [u8]) -> oscwire_transport::Result<usize> {
            let mut state = self.state.lock().unwrap();
            if state.closed && state.inbound.is_empty() {
                return Err(TransportError::Disconnected);
            }
            let n = buf.len().min(state.inbound.len());
            for slot in &mut buf[..n] {
                *slot = state.inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn send(&mut self, data: &[u8]) -> oscwire_transport::Result<usize> {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(TransportError::Disconnected);
            }
            let n = if state.short_writes { data.len() / 2 } else { data.len() };
            state.outbound.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn try_clone(&self) -> oscwire_transport::Result<Self> {
            if self.state.lock().unwrap().refuse_clone {
                return Err(TransportError::Io(std::io::Error::other("clone refused")));
            }
            Ok(self.clone())
        }

        fn shutdown(&mut self) -> oscwire_transport::Result<()> {
            self.state.lock().unwrap().shut_down = true;
            Ok(())
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_idle_timeout(Duration::from_secs(10))
    }

    fn manual_session(
        config: SessionConfig,
    ) -> (MockTransport, ManualClock, OscSession<MockTransport>) {
        let transport = MockTransport::default();
        let clock = ManualClock::new();
        let session = OscSession::with_parts(
            transport.clone(),
            config,
            DispatchMap::new(),
            Arc::new(clock.clone()),
        );
        (transport, clock, session)
    }

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Let the worker run a good number of iterations.
    fn settle() {
        std::thread::sleep(Duration::from_millis(30));
    }

    fn test_message() -> OscMessage {
        let mut msg = OscMessage::with_address("/test");
        msg.write_i32(42).unwrap();
        msg
    }

    #[test]
    fn busy_send_lock_skips_heartbeat_and_timeout_still_fires() {
        let config = fast_config()
            .with_heartbeat_interval(Duration::from_millis(100))
            .with_idle_timeout(Duration::from_millis(500));
        let (transport, clock, session) = manual_session(config);
        session.start().unwrap();

        let held = lock(&session.shared.writer);
        clock.advance(Duration::from_millis(600));
        wait_until("exit request", || session.shared.exit_requested.load(Ordering::SeqCst));
        drop(held);

        wait_until("stopped", || !session.is_connected());
        assert_eq!(transport.ping_count(), 0);
        assert!(transport.shut_down());
    }

    #[test]
    fn lifecycle_transitions() {
        let (transport, _clock, session) = manual_session(fast_config());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_connected());

        session.start().unwrap();
        assert!(session.is_connected());
        assert!(matches!(session.start(), Err(SessionError::AlreadyRunning)));

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(transport.shut_down());
        assert!(matches!(session.start(), Err(SessionError::AlreadyStopped)));

        // Second stop is a no-op.
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn send_before_start_is_rejected() {
        let (transport, _clock, session) = manual_session(fast_config());
        let err = session.send_packet(&test_message()).unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert!(transport.sent_payloads().is_empty());
    }

    #[test]
    fn send_writes_length_prefix_then_payload() {
        let (transport, _clock, session) = manual_session(fast_config());
        session.start().unwrap();
        session.send_packet(&test_message()).unwrap();

        let outbound = transport.state.lock().unwrap().outbound.clone();
        assert_eq!(&outbound[..4], &[16, 0, 0, 0]);
        assert_eq!(&outbound[4..], test_message().write_to_buffer().as_ref());
    }

    #[test]
    fn empty_payload_is_rejected() {
        let (transport, _clock, session) = manual_session(fast_config());
        session.start().unwrap();
        assert!(matches!(
            session.send_packet_data(&[]),
            Err(SessionError::EmptyPayload)
        ));
        assert!(transport.sent_payloads().is_empty());
    }

    #[test]
    fn short_write_is_reported() {
        let (transport, _clock, session) = manual_session(fast_config());
        session.start().unwrap();
        transport.state.lock().unwrap().short_writes = true;

        let err = session.send_packet(&test_message()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::ShortWrite {
                written: 2,
                expected: 4
            }
        ));
    }

    #[test]
    fn send_updates_last_outbound() {
        let (_transport, clock, session) = manual_session(fast_config());
        session.start().unwrap();
        clock.advance(Duration::from_secs(2));
        session.send_packet(&test_message()).unwrap();
        assert_eq!(session.last_outbound(), Duration::from_secs(2));
    }

    #[test]
    fn inbound_frames_dispatch_in_order() {
        let (transport, _clock, session) = manual_session(fast_config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            session.dispatch_map().register("*", move |msg| {
                seen.lock().unwrap().push((msg.address().to_string(), msg.read_i32().ok()));
            });
        }
        session.start().unwrap();

        transport.push_message(&test_message());
        transport.push_message(&OscMessage::with_address("/second"));
        wait_until("two queued packets", || session.pending() == 2);

        assert_eq!(session.dispatch_messages(), 2);
        assert_eq!(session.pending(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("/test".to_string(), Some(42)), ("/second".to_string(), None)]
        );
        assert_eq!(session.dispatch_messages(), 0);
    }

    #[test]
    fn malformed_and_oversized_frames_are_dropped() {
        let config = fast_config().with_max_payload_size(32);
        let (transport, _clock, session) = manual_session(config);
        session.start().unwrap();

        transport.push_frame(b"/no-terminator");
        transport.push_frame(&[0x2F; 64]);
        transport.push_message(&OscMessage::with_address("/ok"));

        wait_until("valid packet", || session.pending() == 1);
        settle();
        assert_eq!(session.pending(), 1);
        let packet = session.try_recv().unwrap();
        assert_eq!(packet.as_message().unwrap().address(), "/ok");
        assert!(session.is_connected());
    }

    #[test]
    fn decode_policy_is_applied_to_received_messages() {
        let config = fast_config().with_decode_policy(DecodePolicy::SkipField);
        let (transport, _clock, session) = manual_session(config);
        session.start().unwrap();
        transport.push_message(&test_message());

        let packet = session.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            packet.as_message().unwrap().decode_policy(),
            DecodePolicy::SkipField
        );
    }

    #[test]
    fn heartbeat_once_per_quiet_interval() {
        let config = fast_config().with_idle_timeout(Duration::from_secs(3600));
        let (transport, clock, session) = manual_session(config);
        session.start().unwrap();

        settle();
        assert_eq!(transport.ping_count(), 0);

        clock.advance(Duration::from_secs(5));
        wait_until("first ping", || transport.ping_count() == 1);
        settle();
        assert_eq!(transport.ping_count(), 1);

        clock.advance(Duration::from_secs(4));
        settle();
        assert_eq!(transport.ping_count(), 1);

        clock.advance(Duration::from_secs(1));
        wait_until("second ping", || transport.ping_count() == 2);
        settle();
        assert_eq!(transport.ping_count(), 2);
        assert_eq!(transport.sent_payloads()[0].len(), 12);
    }

    #[test]
    fn outbound_traffic_defers_heartbeat() {
        let config = fast_config().with_idle_timeout(Duration::from_secs(3600));
        let (transport, clock, session) = manual_session(config);
        session.start().unwrap();

        clock.advance(Duration::from_secs(4));
        session.send_packet(&test_message()).unwrap();
        clock.advance(Duration::from_secs(4));
        settle();
        assert_eq!(transport.ping_count(), 0);

        clock.advance(Duration::from_secs(1));
        wait_until("deferred ping", || transport.ping_count() == 1);
    }

    #[test]
    fn idle_timeout_stops_session() {
        let (transport, clock, session) = manual_session(fast_config());
        session.start().unwrap();

        clock.advance(Duration::from_secs(9));
        settle();
        assert!(session.is_connected());

        clock.advance(Duration::from_secs(1));
        wait_until("timeout", || !session.is_connected());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(transport.shut_down());
        assert!(matches!(
            session.send_packet(&test_message()),
            Err(SessionError::NotConnected)
        ));
        // Stop after the worker exited on its own just joins.
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn inbound_activity_postpones_timeout() {
        let (transport, clock, session) = manual_session(fast_config());
        session.start().unwrap();

        clock.advance(Duration::from_secs(8));
        transport.push_message(&OscMessage::with_address("/alive"));
        wait_until("packet", || session.pending() == 1);
        assert_eq!(session.last_activity(), Duration::from_secs(8));

        clock.advance(Duration::from_secs(4));
        settle();
        assert!(session.is_connected());

        clock.advance(Duration::from_secs(6));
        wait_until("timeout", || !session.is_connected());
    }

    #[test]
    fn dead_transport_ends_in_timeout() {
        let (transport, clock, session) = manual_session(fast_config());
        session.start().unwrap();
        transport.state.lock().unwrap().closed = true;

        settle();
        assert!(session.is_connected());
        clock.advance(Duration::from_secs(10));
        wait_until("timeout", || !session.is_connected());
    }

    #[test]
    fn clone_failure_keeps_session_idle() {
        let (transport, _clock, session) = manual_session(fast_config());
        transport.state.lock().unwrap().refuse_clone = true;

        assert!(matches!(session.start(), Err(SessionError::Spawn(_))));
        assert_eq!(session.state(), SessionState::Idle);

        transport.state.lock().unwrap().refuse_clone = false;
        session.start().unwrap();
        assert!(session.is_connected());
    }

    #[test]
    fn drop_stops_worker_and_releases_transport() {
        let (transport, _clock, session) = manual_session(fast_config());
        session.start().unwrap();
        drop(session);
        assert!(transport.shut_down());
    }

    #[test]
    fn concurrent_senders_never_interleave_frames() {
        let (transport, _clock, session) = manual_session(
            fast_config().with_idle_timeout(Duration::from_secs(3600)),
        );
        let session = Arc::new(session);
        session.start().unwrap();

        let threads: Vec<_> = (0..8u8)
            .map(|id| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    for round in 0..50usize {
                        let payload = vec![id; 1 + (round % 13) * 4];
                        session.send_packet_data(&payload).unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let payloads = transport.sent_payloads();
        assert_eq!(payloads.len(), 400);
        for payload in &payloads {
            assert!(payload.iter().all(|b| *b == payload[0]), "frame interleaved");
        }
    }

    #[test]
    fn dispatch_and_enqueue_run_concurrently() {
        let (transport, _clock, session) = manual_session(
            fast_config().with_idle_timeout(Duration::from_secs(3600)),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            session.dispatch_map().register("/n", move |msg| {
                seen.lock().unwrap().push(msg.read_i32().unwrap());
            });
        }
        session.start().unwrap();

        let feeder_transport = transport.clone();
        let feeder = std::thread::spawn(move || {
            for n in 0..100 {
                let mut msg = OscMessage::with_address("/n");
                msg.write_i32(n).unwrap();
                feeder_transport.push_message(&msg);
                if n % 10 == 0 {
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
        });

        let mut delivered = 0usize;
        wait_until("all messages dispatched", || {
            delivered += session.dispatch_messages();
            delivered == 100
        });
        feeder.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<i32>>());
    }
}
