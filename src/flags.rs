//! Broadcast flags: `speaking` (barge-in) and `exit` (shutdown)
//!
//! Both are level-triggered booleans observed by every stage within one
//! poll interval (§5). A `Condvar` lets waiters block for up to a duration
//! and wake early the instant the flag flips, matching the original's
//! `threading.Event.wait(timeout)` used for the Responder's interruptible
//! retry backoff and the local Sink's per-word wait.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct Flag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Flag {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn set(&self) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        *guard = true;
        cvar.notify_all();
    }

    pub fn clear(&self) {
        let (lock, cvar) = &*self.inner;
        let mut guard = lock.lock().unwrap();
        *guard = false;
        cvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap()
    }

    /// Block for up to `timeout`, waking early if the flag becomes set.
    /// Returns whether the flag was set when the wait ended.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = cvar.wait_timeout(guard, timeout).unwrap();
        *guard
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new()
    }
}

/// Set by the Segmenter on speech-start, cleared on speech-end.
pub type SpeakingFlag = Flag;

/// Set by bootstrap on shutdown, by telephony `stop`, or by a transport
/// error. Level-triggered; every blocking wait bounds itself to ~250ms.
pub type ExitFlag = Flag;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_returns_immediately_when_already_set() {
        let f = Flag::new();
        f.set();
        let start = Instant::now();
        assert!(f.wait(Duration::from_millis(250)));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn wait_times_out_when_never_set() {
        let f = Flag::new();
        assert!(!f.wait(Duration::from_millis(20)));
    }

    #[test]
    fn wait_wakes_early_on_set_from_another_thread() {
        let f = Flag::new();
        let f2 = f.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            f2.set();
        });
        assert!(f.wait(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }
}
