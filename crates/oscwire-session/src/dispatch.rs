use oscwire_codec::OscMessage;
use tracing::trace;

/// Receives decoded messages from [`crate::OscSession::dispatch_messages`].
pub trait Dispatch: Send {
    /// Handle one message. Returns `true` if anything consumed it.
    fn dispatch_message(&mut self, msg: &OscMessage) -> bool;
}

/// Boxed message handler.
///
/// Each handler gets its own copy of the message with fresh read cursors.
pub type Handler = Box<dyn FnMut(&mut OscMessage) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AddressPattern {
    Exact(String),
    Prefix(String),
}

impl AddressPattern {
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => AddressPattern::Prefix(prefix.to_string()),
            None => AddressPattern::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, address: &str) -> bool {
        match self {
            AddressPattern::Exact(exact) => exact == address,
            AddressPattern::Prefix(prefix) => address.starts_with(prefix.as_str()),
        }
    }
}

struct Route {
    pattern: String,
    matcher: AddressPattern,
    handler: Handler,
}

/// Address-keyed handler table.
///
/// A pattern is either an exact address (`/mixer/gain`) or a prefix ending
/// in `*` (`/mixer/*`, or `*` for everything). Every matching route runs, in
/// registration order. Messages no route matches go to the fallback, if set.
#[derive(Default)]
pub struct DispatchMap {
    routes: Vec<Route>,
    fallback: Option<Handler>,
}

impl DispatchMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for addresses matching `pattern`.
    pub fn register<F>(&mut self, pattern: &str, handler: F)
    where
        F: FnMut(&mut OscMessage) + Send + 'static,
    {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            matcher: AddressPattern::parse(pattern),
            handler: Box::new(handler),
        });
    }

    /// Handler for messages no route matches.
    pub fn set_fallback<F>(&mut self, handler: F)
    where
        F: FnMut(&mut OscMessage) + Send + 'static,
    {
        self.fallback = Some(Box::new(handler));
    }

    pub fn clear_fallback(&mut self) {
        self.fallback = None;
    }

    /// Remove every route registered with exactly `pattern`. Returns how many
    /// were removed.
    pub fn remove(&mut self, pattern: &str) -> usize {
        let before = self.routes.len();
        self.routes.retain(|route| route.pattern != pattern);
        before - self.routes.len()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered patterns, in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.pattern.as_str())
    }
}

impl Dispatch for DispatchMap {
    fn dispatch_message(&mut self, msg: &OscMessage) -> bool {
        let mut matched = false;
        for route in &mut self.routes {
            if route.matcher.matches(msg.address()) {
                let mut view = msg.read_view();
                (route.handler)(&mut view);
                matched = true;
            }
        }
        if matched {
            return true;
        }

        match &mut self.fallback {
            Some(fallback) => {
                let mut view = msg.read_view();
                fallback(&mut view);
                true
            }
            None => {
                trace!(address = msg.address(), "no handler for osc address");
                false
            }
        }
    }
}

impl std::fmt::Debug for DispatchMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchMap")
            .field("patterns", &self.patterns().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&mut OscMessage) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |msg: &mut OscMessage| {
            sink.lock().unwrap().push(msg.address().to_string());
        })
    }

    #[test]
    fn exact_and_prefix_routes() {
        let mut map = DispatchMap::new();
        let (exact, exact_handler) = recorder();
        let (prefix, prefix_handler) = recorder();
        map.register("/mixer/gain", exact_handler);
        map.register("/mixer/*", prefix_handler);

        assert!(map.dispatch_message(&OscMessage::with_address("/mixer/gain")));
        assert!(map.dispatch_message(&OscMessage::with_address("/mixer/pan")));
        assert!(!map.dispatch_message(&OscMessage::with_address("/transport/play")));

        assert_eq!(*exact.lock().unwrap(), vec!["/mixer/gain"]);
        assert_eq!(*prefix.lock().unwrap(), vec!["/mixer/gain", "/mixer/pan"]);
    }

    #[test]
    fn fallback_only_sees_unmatched() {
        let mut map = DispatchMap::new();
        let (routed, routed_handler) = recorder();
        let (fallback, fallback_handler) = recorder();
        map.register("/a", routed_handler);
        map.set_fallback(fallback_handler);

        map.dispatch_message(&OscMessage::with_address("/a"));
        assert!(map.dispatch_message(&OscMessage::with_address("/b")));

        assert_eq!(*routed.lock().unwrap(), vec!["/a"]);
        assert_eq!(*fallback.lock().unwrap(), vec!["/b"]);

        map.clear_fallback();
        assert!(!map.dispatch_message(&OscMessage::with_address("/b")));
    }

    #[test]
    fn each_handler_reads_from_the_start() {
        let mut msg = OscMessage::with_address("/value");
        msg.write_i32(7).unwrap();
        let msg = OscMessage::create_from_buffer(&msg.write_to_buffer()).unwrap();

        let values = Arc::new(Mutex::new(Vec::new()));
        let mut map = DispatchMap::new();
        for _ in 0..2 {
            let values = Arc::clone(&values);
            map.register("*", move |msg| {
                values.lock().unwrap().push(msg.read_i32().unwrap());
            });
        }

        map.dispatch_message(&msg);
        assert_eq!(*values.lock().unwrap(), vec![7, 7]);
        assert_eq!(msg.position(), 0);
    }

    #[test]
    fn handlers_ignore_the_callers_cursors() {
        let mut msg = OscMessage::with_address("/value");
        msg.write_i32(7).unwrap();
        let mut msg = OscMessage::create_from_buffer(&msg.write_to_buffer()).unwrap();
        assert_eq!(msg.read_i32().unwrap(), 7);
        assert!(msg.read_i32().is_err());
        assert!(msg.is_failed());

        let values = Arc::new(Mutex::new(Vec::new()));
        let mut map = DispatchMap::new();
        let sink = Arc::clone(&values);
        map.set_fallback(move |msg| {
            sink.lock().unwrap().push(msg.read_i32().unwrap());
        });

        assert!(map.dispatch_message(&msg));
        assert_eq!(*values.lock().unwrap(), vec![7]);
    }

    #[test]
    fn remove_drops_matching_patterns() {
        let mut map = DispatchMap::new();
        map.register("/x", |_| {});
        map.register("/y", |_| {});
        map.register("/x", |_| {});

        assert_eq!(map.remove("/x"), 2);
        assert_eq!(map.patterns().collect::<Vec<_>>(), vec!["/y"]);
        assert_eq!(map.remove("/missing"), 0);
        assert_eq!(map.len(), 1);
    }
}
