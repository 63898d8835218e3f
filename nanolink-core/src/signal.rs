//! Context-wide readiness and termination signal.
//!
//! Every state change that could unblock a caller (a message queued or
//! consumed, a pipe attached or closed, a socket closed) bumps a generation
//! counter and wakes all waiters. A blocking call reads the generation, checks
//! its condition, then waits for the generation to move. Termination sets a
//! sticky flag and wakes everyone once more.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::debug;

/// Outcome of [`Signal::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Generation moved, re-check the condition
    Notified,
    /// Deadline passed without a notification
    TimedOut,
    /// The context was terminated
    Terminated,
}

#[derive(Debug, Default)]
pub struct Signal {
    generation: Mutex<u64>,
    cond: Condvar,
    terminated: AtomicBool,
}

impl Signal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation. Read this before checking a wait condition.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Wake all waiters.
    pub fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Set the termination flag and wake all waiters. Idempotent.
    ///
    /// Returns true on the first call only.
    pub fn terminate(&self) -> bool {
        let first = !self.terminated.swap(true, Ordering::SeqCst);
        if first {
            debug!("signal terminated");
        }
        self.notify();
        first
    }

    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Block until the generation differs from `seen`, the deadline passes or
    /// the context is terminated. `None` waits without a deadline.
    pub fn wait(&self, seen: u64, deadline: Option<Instant>) -> Wake {
        let mut generation = self.generation.lock();
        loop {
            if self.is_terminated() {
                return Wake::Terminated;
            }
            if *generation != seen {
                return Wake::Notified;
            }
            match deadline {
                Some(at) => {
                    if self.cond.wait_until(&mut generation, at).timed_out() {
                        return if *generation == seen {
                            Wake::TimedOut
                        } else {
                            Wake::Notified
                        };
                    }
                }
                None => self.cond.wait(&mut generation),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_times_out() {
        let signal = Signal::new();
        let seen = signal.generation();
        let start = Instant::now();
        let wake = signal.wait(seen, Some(start + Duration::from_millis(30)));
        assert_eq!(wake, Wake::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_stale_generation_returns_immediately() {
        let signal = Signal::new();
        let seen = signal.generation();
        signal.notify();
        assert_eq!(signal.wait(seen, None), Wake::Notified);
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let signal = Arc::new(Signal::new());
        let seen = signal.generation();
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait(seen, Some(Instant::now() + Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        signal.notify();
        assert_eq!(waiter.join().unwrap(), Wake::Notified);
    }

    #[test]
    fn test_terminate_is_sticky_and_idempotent() {
        let signal = Signal::new();
        assert!(signal.terminate());
        assert!(!signal.terminate());
        assert!(signal.is_terminated());
        let seen = signal.generation();
        assert_eq!(signal.wait(seen, None), Wake::Terminated);
    }
}
