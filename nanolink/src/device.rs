//! Devices: forwarding loops between raw sockets.

use crate::context::Context;
use crate::io::Mode;
use crate::poll::PollFd;
use nanolink_core::error::{Errno, NanolinkError, Result};
use nanolink_core::protocol::Events;
use nanolink_core::socket_type::SocketType;
use std::convert::Infallible;
use tracing::{debug, trace};

/// Map a failure inside the loop onto the device error class.
fn bridge_error(err: NanolinkError) -> NanolinkError {
    match err {
        NanolinkError::Terminated => NanolinkError::Terminated,
        NanolinkError::InvalidHandle(_) => NanolinkError::Bridge(Errno::BadF),
        other => NanolinkError::Bridge(Errno::from_code(other.errno()).unwrap_or(Errno::Inval)),
    }
}

impl Context {
    /// Forward messages between two raw sockets until an error occurs or the
    /// context is terminated.
    ///
    /// With a negative `b`, messages received on `a` are sent back out of
    /// `a` (loopback device); only BUS sockets support this.
    ///
    /// Never returns `Ok`.
    pub fn device(&self, a: i32, b: i32) -> Result<Infallible> {
        let first = self.lookup(a)?;
        let second = if b < 0 { None } else { Some(self.lookup(b)?) };

        let raw = first.domain().is_raw() && second.as_ref().map_or(true, |s| s.domain().is_raw());
        if !raw {
            return Err(NanolinkError::Bridge(Errno::Inval));
        }
        let compatible = match &second {
            Some(second) => first.kind().is_compatible(second.kind()),
            None => first.kind() == SocketType::Bus,
        };
        if !compatible {
            return Err(NanolinkError::Bridge(Errno::Inval));
        }
        drop((first, second));

        debug!(a, b, "device started");
        let result = if b < 0 {
            self.loopback(a)
        } else {
            self.relay(a, b)
        };
        debug!(a, b, "device stopped");
        result.map_err(bridge_error)
    }

    fn relay(&self, a: i32, b: i32) -> Result<Infallible> {
        let mut fds = [PollFd::new(a, Events::READ), PollFd::new(b, Events::READ)];
        loop {
            self.poll_fds(&mut fds, -1)?;
            if fds[0].revents.contains(Events::READ) {
                self.forward(a, b)?;
            }
            if fds[1].revents.contains(Events::READ) {
                self.forward(b, a)?;
            }
        }
    }

    fn loopback(&self, a: i32) -> Result<Infallible> {
        let mut fds = [PollFd::new(a, Events::READ)];
        loop {
            self.poll_fds(&mut fds, -1)?;
            self.forward(a, a)?;
        }
    }

    /// Move one message, if one is waiting, from `from` to `to`.
    fn forward(&self, from: i32, to: i32) -> Result<()> {
        let msg = match self.recv_message(from, Mode::DontWait) {
            Ok(msg) => msg,
            Err(NanolinkError::WouldBlock) => return Ok(()),
            Err(e) => return Err(e),
        };
        trace!(from, to, len = msg.len(), "forwarding");
        self.send_message(to, msg, Mode::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanolink_core::socket_type::{AF_SP, AF_SP_RAW, BUS, PAIR, PULL, PUSH, REP, REQ};

    #[test]
    fn test_device_requires_raw_sockets() {
        let ctx = Context::new();
        let a = ctx.socket(AF_SP, PAIR).unwrap();
        let b = ctx.socket(AF_SP_RAW, PAIR).unwrap();
        assert!(matches!(ctx.device(a, b), Err(NanolinkError::Bridge(Errno::Inval))));
    }

    #[test]
    fn test_device_requires_peer_protocols() {
        let ctx = Context::new();
        let push = ctx.socket(AF_SP_RAW, PUSH).unwrap();
        let rep = ctx.socket(AF_SP_RAW, REP).unwrap();
        assert!(matches!(ctx.device(push, rep), Err(NanolinkError::Bridge(Errno::Inval))));

        let pull = ctx.socket(AF_SP_RAW, PULL).unwrap();
        let req = ctx.socket(AF_SP_RAW, REQ).unwrap();
        assert!(matches!(ctx.device(pull, req), Err(NanolinkError::Bridge(Errno::Inval))));
    }

    #[test]
    fn test_loopback_only_for_bus() {
        let ctx = Context::new();
        let pair = ctx.socket(AF_SP_RAW, PAIR).unwrap();
        assert!(matches!(ctx.device(pair, -1), Err(NanolinkError::Bridge(Errno::Inval))));

        let bus = ctx.socket(AF_SP_RAW, BUS).unwrap();
        ctx.terminate();
        assert!(matches!(ctx.device(bus, -1), Err(NanolinkError::Terminated)));
    }
}
