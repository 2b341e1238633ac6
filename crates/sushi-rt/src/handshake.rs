//! One-shot RT-safe handshake: the RT thread signals, the non-RT side waits
//! with a timeout (§5). Used for pause (STOPPED_TRANSIENT → STOPPED) and for
//! engine shutdown acknowledgement.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

struct Inner {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// RT-side half: call [`Signal::fire`] exactly once to wake the waiting
/// non-RT side.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    /// Signal completion. Cheap: one short-held `parking_lot::Mutex` critical
    /// section plus a condvar notify, matching the original's one-shot
    /// RT-safe condition variable (§5).
    pub fn fire(&self) {
        let mut signaled = self.inner.signaled.lock();
        *signaled = true;
        self.inner.condvar.notify_one();
    }
}

/// Non-RT-side half: [`Waiter::wait`] blocks until `fire()` is called or the
/// timeout elapses.
pub struct Waiter {
    inner: Arc<Inner>,
}

impl Waiter {
    /// Returns `true` if signaled before the timeout, `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut signaled = self.inner.signaled.lock();
        if *signaled {
            return true;
        }
        let result = self.inner.condvar.wait_for(&mut signaled, timeout);
        *signaled && !result.timed_out()
    }
}

/// Construct a fresh one-shot handshake pair.
pub fn handshake() -> (Signal, Waiter) {
    let inner = Arc::new(Inner {
        signaled: Mutex::new(false),
        condvar: Condvar::new(),
    });
    (
        Signal { inner: inner.clone() },
        Waiter { inner },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fire_before_wait_still_observed() {
        let (signal, waiter) = handshake();
        signal.fire();
        assert!(waiter.wait(Duration::from_millis(10)));
    }

    #[test]
    fn wait_times_out_without_fire() {
        let (_signal, waiter) = handshake();
        assert!(!waiter.wait(Duration::from_millis(5)));
    }

    #[test]
    fn fire_from_another_thread_wakes_waiter() {
        let (signal, waiter) = handshake();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            signal.fire();
        });
        assert!(waiter.wait(Duration::from_secs(1)));
        handle.join().unwrap();
    }
}
