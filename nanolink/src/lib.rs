//! # Nanolink
//!
//! Socket-style messaging over scalability protocols.
//!
//! ## Architecture
//!
//! - **`nanolink-core`**: errors, addresses, messages, options, pipes and the
//!   `Protocol`/`Engine` seams
//! - **`nanolink-sp`**: pattern state machines and the inproc, IPC and TCP
//!   carriers
//! - **`nanolink`**: contexts, socket handles, message I/O, polling and
//!   devices (this crate)
//!
//! ## Patterns
//!
//! | Pattern | Sockets |
//! |---|---|
//! | Exclusive pair | `PAIR` |
//! | Publish/subscribe | `PUB`, `SUB` |
//! | Request/reply | `REQ`, `REP` |
//! | Pipeline | `PUSH`, `PULL` |
//! | Survey | `SURVEYOR`, `RESPONDENT` |
//! | Bus | `BUS` |
//!
//! ## Quick Start
//!
//! ```rust
//! use nanolink::{Context, AF_SP, REP, REQ};
//!
//! let ctx = Context::new();
//! let server = ctx.socket(AF_SP, REP)?;
//! let client = ctx.socket(AF_SP, REQ)?;
//! ctx.bind(server, "inproc://quick-start")?;
//! ctx.connect(client, "inproc://quick-start")?;
//!
//! ctx.send(client, b"ping", 4, 0)?;
//! let request = ctx.recv_msg(server, 0)?;
//! ctx.send(server, &request, request.len(), 0)?;
//! assert_eq!(ctx.recv(client, 64, 0)?, b"ping");
//! # Ok::<(), nanolink::NanolinkError>(())
//! ```
//!
//! The free functions ([`socket`], [`bind`], [`send`], ...) operate on a
//! process-wide default context; [`term`] terminates it.
//!
//! ## Blocking
//!
//! Sends, receives, polls and devices block the calling thread. Pass
//! [`DONTWAIT`] to fail with [`NanolinkError::WouldBlock`] instead, or set
//! `SNDTIMEO`/`RCVTIMEO` to bound the wait.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod context;
/// Tracing setup for benches, tests and examples.
pub mod dev_tracing;
mod device;
mod io;
mod poll;
mod socket;

pub use bytes::Bytes;
pub use context::{Context, ContextConfig, MAX_SOCKETS};
pub use io::{Mode, DONTWAIT};
pub use nanolink_core::endpoint::{Endpoint, SOCKADDR_MAX};
pub use nanolink_core::error::{strerror, Errno, NanolinkError, Result};
pub use nanolink_core::options::{
    OptionValue, SocketOptions, DOMAIN, INPROC, IPC, IPV4ONLY, LINGER, MAXTTL, PROTOCOL,
    RCVBUF, RCVFD, RCVMAXSIZE, RCVPRIO, RCVTIMEO, RECONNECT_IVL, RECONNECT_IVL_MAX, SNDBUF,
    SNDFD, SNDPRIO, SNDTIMEO, SOCKET_NAME, SOL_SOCKET, TCP, TCP_NODELAY,
};
pub use nanolink_core::protocol::Events;
pub use nanolink_core::socket_type::{
    AF_SP, AF_SP_RAW, BUS, PAIR, PUB, PULL, PUSH, REP, REQ, RESPONDENT, SUB, SURVEYOR,
};
pub use nanolink_sp::protocols::{REQ_RESEND_IVL, SUB_SUBSCRIBE, SUB_UNSUBSCRIBE, SURVEYOR_DEADLINE};
pub use poll::{PollFd, PollResult};

use once_cell::sync::Lazy;
use std::convert::Infallible;

static DEFAULT: Lazy<Context> = Lazy::new(Context::new);

/// The process-wide default context.
pub fn default_context() -> &'static Context {
    &DEFAULT
}

/// Create a socket in the default context.
pub fn socket(domain: i32, protocol: i32) -> Result<i32> {
    DEFAULT.socket(domain, protocol)
}

/// Add a local endpoint to a socket.
pub fn bind(handle: i32, address: &str) -> Result<i32> {
    DEFAULT.bind(handle, address)
}

/// Add a remote endpoint to a socket.
pub fn connect(handle: i32, address: &str) -> Result<i32> {
    DEFAULT.connect(handle, address)
}

/// Remove one endpoint from a socket.
pub fn shutdown(handle: i32, endpoint: i32) -> Result<()> {
    DEFAULT.shutdown(handle, endpoint)
}

/// Close a socket.
pub fn close(handle: i32) -> Result<()> {
    DEFAULT.close(handle)
}

/// Read an integer option.
pub fn get_option(handle: i32, level: i32, option: i32) -> Result<i32> {
    DEFAULT.get_option(handle, level, option)
}

/// Read an option of any kind.
pub fn get_option_value(handle: i32, level: i32, option: i32) -> Result<OptionValue> {
    DEFAULT.get_option_value(handle, level, option)
}

/// Set an option.
pub fn set_option(handle: i32, level: i32, option: i32, value: impl Into<OptionValue>) -> Result<()> {
    DEFAULT.set_option(handle, level, option, value)
}

/// Poll read, write and read-or-write handle sets.
pub fn poll(read: &[i32], write: &[i32], both: &[i32], timeout_ms: i32) -> Result<Option<PollResult>> {
    DEFAULT.poll(read, write, both, timeout_ms)
}

/// Send the first `len` bytes of `data`.
pub fn send(handle: i32, data: &[u8], len: usize, flags: i32) -> Result<usize> {
    DEFAULT.send(handle, data, len, flags)
}

/// Receive at most `max` bytes of the next message.
pub fn recv(handle: i32, max: usize, flags: i32) -> Result<Vec<u8>> {
    DEFAULT.recv(handle, max, flags)
}

/// Receive the next whole message.
pub fn recv_msg(handle: i32, flags: i32) -> Result<Bytes> {
    DEFAULT.recv_msg(handle, flags)
}

/// Forward messages between two raw sockets until failure or termination.
pub fn device(a: i32, b: i32) -> Result<Infallible> {
    DEFAULT.device(a, b)
}

/// Terminate the default context. Idempotent.
pub fn term() {
    DEFAULT.terminate();
}
