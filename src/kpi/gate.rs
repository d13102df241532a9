//! Single-fire completion gate.
//!
//! Signaled once a stream has fully drained and closed. Any number of
//! threads may wait on it; once signaled it stays signaled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateInner {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Cloneable handle to a completion gate.
#[derive(Clone, Debug, Default)]
pub struct CompletionGate {
    inner: Arc<GateInner>,
}

impl CompletionGate {
    /// Create an open (not yet signaled) gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate that is already signaled.
    ///
    /// Used when there is nothing to drain, so waiting never hangs.
    pub fn signaled() -> Self {
        let gate = Self::new();
        gate.signal();
        gate
    }

    /// Signal completion, waking every waiter. Later calls are no-ops.
    pub fn signal(&self) {
        let mut signaled = self.inner.signaled.lock();
        if !*signaled {
            *signaled = true;
            self.inner.cond.notify_all();
        }
    }

    /// Check whether the gate has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.inner.signaled.lock()
    }

    /// Block until the gate is signaled.
    pub fn wait(&self) {
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            self.inner.cond.wait(&mut signaled);
        }
    }

    /// Block until the gate is signaled or the timeout elapses.
    ///
    /// Returns true if the gate was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            if self.inner.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }

    /// Wait with an optional bound. `None` waits indefinitely.
    pub fn wait_for(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(timeout) => self.wait_timeout(timeout),
            None => {
                self.wait();
                true
            }
        }
    }
}
