//! Scalability-protocol state machines.
//!
//! Each pattern exists in a cooked form (`AF_SP`) implementing the full
//! state machine and a raw form (`AF_SP_RAW`) that exposes protocol headers
//! so devices can forward messages without interpreting them.

mod bus;
mod pair;
mod pipeline;
pub(crate) mod pipes;
mod pubsub;
mod reqrep;
mod survey;

pub use bus::Bus;
pub use pair::Pair;
pub use pipeline::{Pull, Push};
pub use pubsub::{Publisher, Subscriber};
pub use reqrep::{Requester, Responder};
pub use survey::Surveyor;

use bytes::{BufMut, Bytes, BytesMut};
use nanolink_core::error::Errno;
use nanolink_core::protocol::{ProtoResult, Protocol};
use nanolink_core::socket_type::{Domain, SocketType};

/// Protocol-level option of REQ: request resend interval in milliseconds.
pub const REQ_RESEND_IVL: i32 = 1;
/// Protocol-level option of SUB: add a prefix subscription.
pub const SUB_SUBSCRIBE: i32 = 1;
/// Protocol-level option of SUB: remove a prefix subscription.
pub const SUB_UNSUBSCRIBE: i32 = 2;
/// Protocol-level option of SURVEYOR: survey deadline in milliseconds.
pub const SURVEYOR_DEADLINE: i32 = 1;

/// Top bit of a backtrace word marks the request or survey id.
pub(crate) const ID_FLAG: u32 = 0x8000_0000;

/// Instantiate the state machine for a `(domain, protocol)` pair.
pub fn create(domain: i32, protocol: i32) -> ProtoResult<Box<dyn Protocol>> {
    let domain = Domain::from_i32(domain).ok_or(Errno::AfNoSupport)?;
    let ty = SocketType::from_i32(protocol).ok_or(Errno::Inval)?;
    let raw = domain.is_raw();
    Ok(match ty {
        SocketType::Pair => Box::new(Pair::new(raw)),
        SocketType::Pub => Box::new(Publisher::new(raw)),
        SocketType::Sub => Box::new(Subscriber::new(raw)),
        SocketType::Req => Box::new(Requester::new(SocketType::Req, raw)),
        SocketType::Rep => Box::new(Responder::new(SocketType::Rep, raw)),
        SocketType::Push => Box::new(Push::new(raw)),
        SocketType::Pull => Box::new(Pull::new(raw)),
        SocketType::Surveyor => Box::new(Surveyor::new(raw)),
        SocketType::Respondent => Box::new(Responder::new(SocketType::Respondent, raw)),
        SocketType::Bus => Box::new(Bus::new(raw)),
    })
}

/// Prepend a 4-byte word to a body.
pub(crate) fn with_word(word: u32, body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32(word);
    out.put_slice(body);
    out.freeze()
}

/// First 4-byte word of a buffer.
pub(crate) fn first_word(buf: &[u8]) -> Option<u32> {
    buf.get(..4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
}

/// Initial value for request and survey id counters.
pub(crate) fn initial_id() -> u32 {
    rand::random::<u32>()
}
