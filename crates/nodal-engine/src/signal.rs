//! Counting wake-up signal from the real-time thread to the post-processor.
//!
//! [`Signal::post`] is real-time safe: an atomic increment and a
//! `Thread::unpark`, which never allocates and never waits on a lock the
//! waiter holds. There is exactly one waiting thread.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Single-waiter counting semaphore.
#[derive(Debug, Default)]
pub struct Signal {
    count: AtomicUsize,
    waiter: OnceLock<Thread>,
}

impl Signal {
    /// Creates a signal with a count of zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the count and wakes the waiter.
    #[inline]
    pub fn post(&self) {
        self.count.fetch_add(1, Ordering::Release);
        if let Some(waiter) = self.waiter.get() {
            waiter.unpark();
        }
    }

    /// Decrements the count if it is positive.
    pub fn try_wait(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Waits up to `timeout` for the count to become positive, then
    /// decrements it. Returns `false` on timeout.
    ///
    /// Must always be called from the same thread.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let me = self.waiter.get_or_init(thread::current);
        debug_assert_eq!(me.id(), thread::current().id(), "Signal has one waiter");
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_wait() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::park_timeout(deadline - now);
        }
    }

    /// Current count (for statistics).
    pub fn pending(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_posts() {
        let s = Signal::new();
        s.post();
        s.post();
        assert_eq!(s.pending(), 2);
        assert!(s.try_wait());
        assert!(s.try_wait());
        assert!(!s.try_wait());
    }

    #[test]
    fn wait_times_out() {
        let s = Signal::new();
        assert!(!s.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn wakes_waiter_from_other_thread() {
        let s = Arc::new(Signal::new());
        let waiter = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        s.post();
        assert!(waiter.join().unwrap());
    }
}
