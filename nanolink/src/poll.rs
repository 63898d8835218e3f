//! Readiness polling across sockets.

use crate::context::Context;
use nanolink_core::error::{Errno, NanolinkError, Result};
use nanolink_core::protocol::Events;
use nanolink_core::signal::Wake;
use std::time::{Duration, Instant};
use tracing::trace;

/// One entry of a [`Context::poll_fds`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollFd {
    /// Socket handle
    pub fd: i32,
    /// Directions of interest
    pub events: Events,
    /// Directions found ready, filled in by the poll
    pub revents: Events,
}

impl PollFd {
    /// Entry asking for `events` on `fd`.
    #[must_use]
    pub const fn new(fd: i32, events: Events) -> Self {
        Self {
            fd,
            events,
            revents: Events::NONE,
        }
    }
}

/// Handles found ready by [`Context::poll`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    /// Handles ready to receive, in request order
    pub read: Vec<i32>,
    /// Handles ready to send, in request order
    pub write: Vec<i32>,
}

fn deadline_after(timeout_ms: i32) -> Option<Instant> {
    u64::try_from(timeout_ms)
        .ok()
        .map(|ms| Instant::now() + Duration::from_millis(ms))
}

impl Context {
    /// Wait until at least one entry is ready or `timeout_ms` elapses.
    ///
    /// Fills in `revents` and returns the number of entries with any
    /// direction ready; 0 on timeout. A negative timeout waits indefinitely.
    ///
    /// An empty request with a negative timeout fails with `Poll(EINVAL)`:
    /// nothing in it could ever become ready.
    pub fn poll_fds(&self, fds: &mut [PollFd], timeout_ms: i32) -> Result<usize> {
        if fds.is_empty() && timeout_ms < 0 {
            return Err(NanolinkError::Poll(Errno::Inval));
        }
        let sockets = fds
            .iter()
            .map(|fd| self.lookup(fd.fd))
            .collect::<Result<Vec<_>>>()?;
        let deadline = deadline_after(timeout_ms);
        let signal = self.signal();

        loop {
            let seen = signal.generation();
            if signal.is_terminated() {
                return Err(NanolinkError::Terminated);
            }

            let mut ready = 0;
            let mut wake = deadline;
            for (fd, socket) in fds.iter_mut().zip(&sockets) {
                if socket.is_closed() {
                    return Err(NanolinkError::InvalidHandle(fd.fd));
                }
                let (events, timer) = socket.readiness();
                fd.revents = events & fd.events;
                if !fd.revents.is_empty() {
                    ready += 1;
                }
                if let Some(timer) = timer {
                    wake = Some(wake.map_or(timer, |w| w.min(timer)));
                }
            }

            if ready > 0 {
                return Ok(ready);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(0);
            }
            if signal.wait(seen, wake) == Wake::Terminated {
                return Err(NanolinkError::Terminated);
            }
        }
    }

    /// Poll three handle sets: `read` for receive readiness, `write` for
    /// send readiness and `both` for either.
    ///
    /// Returns `None` when nothing became ready before the timeout. A handle
    /// in `both` that is ready in both directions appears in both outputs.
    pub fn poll(
        &self,
        read: &[i32],
        write: &[i32],
        both: &[i32],
        timeout_ms: i32,
    ) -> Result<Option<PollResult>> {
        let mut fds: Vec<PollFd> = read
            .iter()
            .map(|&fd| PollFd::new(fd, Events::READ))
            .chain(write.iter().map(|&fd| PollFd::new(fd, Events::WRITE)))
            .chain(both.iter().map(|&fd| PollFd::new(fd, Events::BOTH)))
            .collect();

        let mut remaining = self.poll_fds(&mut fds, timeout_ms)?;
        if remaining == 0 {
            return Ok(None);
        }

        let mut result = PollResult::default();
        for fd in &fds {
            if remaining == 0 {
                break;
            }
            if fd.revents.is_empty() {
                continue;
            }
            remaining -= 1;
            if fd.revents.contains(Events::READ) {
                result.read.push(fd.fd);
            }
            if fd.revents.contains(Events::WRITE) {
                result.write.push(fd.fd);
            }
        }
        trace!(read = result.read.len(), write = result.write.len(), "poll ready");
        Ok(Some(result))
    }
}
