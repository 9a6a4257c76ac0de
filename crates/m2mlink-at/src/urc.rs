//! Observers for unsolicited result codes.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, trace};

use crate::lock;

/// Receives unsolicited result codes (`+CREG: 1`, `RING`, ...).
pub trait UrcListener: Send + Sync {
    fn on_urc(&self, line: &str);
}

impl<F> UrcListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_urc(&self, line: &str) {
        self(line)
    }
}

/// Handle returned by `add_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urc-listener-{}", self.0)
    }
}

/// Registered URC listeners, invoked in registration order.
#[derive(Default)]
pub(crate) struct UrcListeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<dyn UrcListener>)>>,
}

impl UrcListeners {
    pub(crate) fn add(&self, listener: Arc<dyn UrcListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Deliver one line to every listener.
    ///
    /// Listeners run outside the registry lock so they may add or remove
    /// listeners themselves. A panicking listener is logged and skipped.
    pub(crate) fn dispatch(&self, line: &str) {
        let snapshot: Vec<_> = lock(&self.entries).clone();
        trace!(listeners = snapshot.len(), line, "urc");
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener.on_urc(line))).is_err() {
                error!(%id, line, "URC listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn dispatch_reaches_listeners_in_order() {
        let listeners = UrcListeners::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        listeners.add(Arc::new(move |line: &str| {
            first.lock().unwrap().push(format!("a:{line}"))
        }));
        let second = Arc::clone(&seen);
        listeners.add(Arc::new(move |line: &str| {
            second.lock().unwrap().push(format!("b:{line}"))
        }));

        listeners.dispatch("RING");
        assert_eq!(*seen.lock().unwrap(), vec!["a:RING", "b:RING"]);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let listeners = UrcListeners::default();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let id = listeners.add(Arc::new(move |_: &str| *counter.lock().unwrap() += 1));

        listeners.dispatch("+CREG: 1");
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.dispatch("+CREG: 0");

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        let listeners = UrcListeners::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        listeners.add(Arc::new(|_: &str| panic!("listener failure")));
        let sink = Arc::clone(&seen);
        listeners.add(Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string())
        }));

        listeners.dispatch("RING");
        assert_eq!(*seen.lock().unwrap(), vec!["RING"]);
    }

    #[test]
    fn ids_are_distinct() {
        let listeners = UrcListeners::default();
        let a = listeners.add(Arc::new(|_: &str| {}));
        let b = listeners.add(Arc::new(|_: &str| {}));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "urc-listener-0");
    }
}
