//! In-crate connection double for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::connection::Connection;

#[derive(Debug, Error)]
#[error("test connection {0} refused to stop")]
pub struct TestConnectionError(pub String);

#[derive(Debug)]
pub struct TestConnection {
    pub name: String,
    pub fail_stop: bool,
    disabled: AtomicBool,
    stopped: AtomicBool,
}

impl TestConnection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_stop: false,
            disabled: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn shared(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_stop: true,
            ..Self::new(name)
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Connection for TestConnection {
    type Transport = ();
    type Error = TestConnectionError;

    fn transport(&self) -> &Self::Transport {
        &()
    }

    fn id(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        !self.is_disabled()
    }

    fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    fn stop(&self) -> Result<(), Self::Error> {
        self.stopped.store(true, Ordering::SeqCst);
        if self.fail_stop {
            return Err(TestConnectionError(self.name.clone()));
        }
        Ok(())
    }
}
