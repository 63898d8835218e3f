//! Seams between the socket layer, the protocol engine and the carriers.
//!
//! - [`Protocol`]: a pattern state machine owned by one socket
//! - [`PipeHost`]: the socket as seen by a carrier that attaches pipes to it
//! - [`Engine`]: creates protocols by number and opens carrier endpoints
//!
//! Protocols and carriers report failures as bare [`Errno`] values; the socket
//! layer classifies them into [`crate::error::NanolinkError`] variants.

use crate::endpoint::Endpoint;
use crate::error::Errno;
use crate::message::Message;
use crate::options::{OptionValue, SocketOptions};
use crate::pipe::{Pipe, PipeConfig};
use crate::signal::Signal;
use crate::socket_type::SocketType;
use std::ops::{BitAnd, BitOr};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Result type for protocol and carrier operations
pub type ProtoResult<T> = std::result::Result<T, Errno>;

/// Readiness mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Events(u8);

impl Events {
    pub const NONE: Self = Self(0);
    /// A receive would not block (`POLLIN`)
    pub const READ: Self = Self(1);
    /// A send would not block (`POLLOUT`)
    pub const WRITE: Self = Self(2);
    pub const BOTH: Self = Self(3);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 3)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn new(readable: bool, writable: bool) -> Self {
        Self((readable as u8) | ((writable as u8) << 1))
    }
}

impl BitOr for Events {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for Events {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// A scalability-pattern state machine.
///
/// All methods are non-blocking. `send` and `recv` return `Err(Errno::Again)`
/// when the operation would block; the socket layer decides whether to wait.
pub trait Protocol: Send {
    fn socket_type(&self) -> SocketType;

    /// True for `AF_SP_RAW` sockets.
    fn is_raw(&self) -> bool;

    /// Take ownership of a new pipe. Rejecting it drops (and closes) it.
    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()>;

    /// Queue a message.
    fn send(&mut self, msg: Message) -> ProtoResult<()>;

    /// Take the next message.
    fn recv(&mut self) -> ProtoResult<Message>;

    /// Current readiness.
    fn events(&mut self) -> Events;

    /// Close every pipe. Called once when the socket closes.
    fn close(&mut self);

    fn set_option(&mut self, option: i32, value: &OptionValue) -> ProtoResult<()> {
        let _ = (option, value);
        Err(Errno::NoProtoOpt)
    }

    fn get_option(&self, option: i32) -> ProtoResult<OptionValue> {
        let _ = option;
        Err(Errno::NoProtoOpt)
    }

    /// Socket-level options changed. Called once at creation and after every
    /// `SOL_SOCKET` update.
    fn configure(&mut self, options: &SocketOptions) {
        let _ = options;
    }

    /// Earliest instant at which `on_timer` has work to do.
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    /// Run timer work (request resend, survey expiry) due at `now`.
    fn on_timer(&mut self, now: Instant) {
        let _ = now;
    }
}

/// The socket side of a carrier connection.
pub trait PipeHost: Send + Sync {
    /// Socket handle, for logging.
    fn socket_id(&self) -> i32;

    fn socket_type(&self) -> SocketType;

    /// Options snapshot applied to new endpoints and pipes.
    fn options(&self) -> SocketOptions;

    /// Readiness signal of the owning context.
    fn signal(&self) -> Arc<Signal>;

    /// Hand a connected pipe to the socket's protocol.
    fn attach_pipe(&self, pipe: Pipe) -> ProtoResult<()>;

    /// Whether a peer speaking `protocol` may connect.
    fn accepts_peer(&self, protocol: u16) -> bool {
        SocketType::from_u16(protocol).is_some_and(|peer| self.socket_type().is_compatible(peer))
    }

    /// Pipe configuration for the socket end of a new pipe.
    fn pipe_config(&self) -> PipeConfig {
        let opts = self.options();
        PipeConfig {
            send_priority: opts.send_priority,
            recv_priority: opts.recv_priority,
            inbound_capacity: opts.rcvbuf,
        }
    }
}

/// Whether an endpoint listens or dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Bind,
    Connect,
}

/// A live bind or connect endpoint.
pub trait EndpointHandle: Send {
    fn endpoint(&self) -> &Endpoint;

    /// Stop listening or reconnecting and close the endpoint's pipes.
    fn shutdown(self: Box<Self>);
}

/// Protocol engine and carrier layer selected by a context.
pub trait Engine: Send + Sync {
    /// Instantiate the state machine for a `(domain, protocol)` pair.
    fn create_protocol(&self, domain: i32, protocol: i32) -> ProtoResult<Box<dyn Protocol>>;

    /// Open a bind or connect endpoint on behalf of `host`.
    ///
    /// Must not block on network activity; connection establishment happens
    /// in the background.
    fn open(
        &self,
        kind: EndpointKind,
        endpoint: &Endpoint,
        host: Weak<dyn PipeHost>,
    ) -> ProtoResult<Box<dyn EndpointHandle>>;

    /// Stop background work after termination.
    fn terminate(&self) {}
}
