//! Message I/O.

use crate::context::Context;
use bytes::Bytes;
use nanolink_core::error::{Errno, NanolinkError, Result};
use nanolink_core::message::Message;

/// Flag: fail with `WouldBlock` instead of waiting.
pub const DONTWAIT: i32 = 1;

/// Whether a send or receive may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Wait for the operation to complete, bounded by `SNDTIMEO`/`RCVTIMEO`
    #[default]
    Block,
    /// Return `WouldBlock` if the operation cannot complete immediately
    DontWait,
}

impl Mode {
    /// Decode boundary flags. Unknown bits are ignored.
    #[must_use]
    pub const fn from_flags(flags: i32) -> Self {
        if flags & DONTWAIT != 0 {
            Self::DontWait
        } else {
            Self::Block
        }
    }
}

impl Context {
    /// Send the first `len` bytes of `data`. Returns the number of bytes sent.
    ///
    /// On raw sockets the protocol header is expected at the front of the
    /// buffer, as returned by [`Context::recv_msg`] on another raw socket.
    pub fn send(&self, handle: i32, data: &[u8], len: usize, flags: i32) -> Result<usize> {
        let socket = self.lookup(handle)?;
        if len > data.len() {
            return Err(NanolinkError::Send(Errno::Inval));
        }
        let msg = Message::new(Bytes::copy_from_slice(&data[..len]));
        socket.send(msg, Mode::from_flags(flags))?;
        Ok(len)
    }

    /// Receive at most `max` bytes of the next message. The rest of a longer
    /// message is discarded.
    pub fn recv(&self, handle: i32, max: usize, flags: i32) -> Result<Vec<u8>> {
        let wire = self.recv_msg(handle, flags)?;
        Ok(wire[..wire.len().min(max)].to_vec())
    }

    /// Receive the next whole message.
    ///
    /// On raw sockets the protocol header is returned in front of the body.
    pub fn recv_msg(&self, handle: i32, flags: i32) -> Result<Bytes> {
        let socket = self.lookup(handle)?;
        Ok(socket.recv(Mode::from_flags(flags))?.to_wire())
    }

    /// Receive a message with its header kept apart. Used by devices.
    pub(crate) fn recv_message(&self, handle: i32, mode: Mode) -> Result<Message> {
        self.lookup(handle)?.recv(mode)
    }

    /// Send a message with an explicit header. Used by devices.
    pub(crate) fn send_message(&self, handle: i32, msg: Message, mode: Mode) -> Result<()> {
        self.lookup(handle)?.send(msg, mode)
    }
}
