//! Mock connection for exercising the shard router without a transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use proven_shard_router::Connection;

/// Connection double that records how the router released it.
#[derive(Debug)]
pub struct MockConnection {
    id: String,
    available: AtomicBool,
    fail_stop: AtomicBool,
    disable_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
}

impl MockConnection {
    /// Create a new mock connection.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            available: AtomicBool::new(true),
            fail_stop: AtomicBool::new(false),
            disable_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a new shared mock connection.
    #[must_use]
    pub fn shared(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(id))
    }

    /// Make every later [`Connection::stop`] call fail.
    pub fn fail_on_stop(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    /// Number of times the connection was disabled.
    #[must_use]
    pub fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }

    /// Number of times the connection was stopped.
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Release calls in the order they were made, `"disable"` or `"stop"`.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl Connection for MockConnection {
    type Transport = str;
    type Error = Error;

    fn transport(&self) -> &Self::Transport {
        &self.id
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn disable(&self) {
        self.available.store(false, Ordering::SeqCst);
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push("disable");
    }

    fn stop(&self) -> Result<(), Self::Error> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push("stop");

        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Error::StopFailed(self.id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_marks_unavailable() {
        let conn = MockConnection::new("a");
        assert!(conn.is_available());

        conn.disable();

        assert!(!conn.is_available());
        assert_eq!(conn.disable_calls(), 1);
        assert_eq!(conn.calls(), vec!["disable"]);
    }

    #[test]
    fn test_stop_can_fail() {
        let conn = MockConnection::new("a");
        assert!(conn.stop().is_ok());

        conn.fail_on_stop();
        assert!(matches!(conn.stop(), Err(Error::StopFailed(id)) if id == "a"));
        assert_eq!(conn.stop_calls(), 2);
    }
}
