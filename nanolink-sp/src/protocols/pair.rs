//! PAIR: exclusive one-to-one link.
//!
//! Only one pipe is attached at a time; further pipes are rejected until the
//! current one closes.

use nanolink_core::error::Errno;
use nanolink_core::message::Message;
use nanolink_core::pipe::{Pipe, PipeError};
use nanolink_core::protocol::{Events, ProtoResult, Protocol};
use nanolink_core::socket_type::SocketType;
use tracing::debug;

#[derive(Debug)]
pub struct Pair {
    raw: bool,
    pipe: Option<Pipe>,
}

impl Pair {
    #[must_use]
    pub const fn new(raw: bool) -> Self {
        Self { raw, pipe: None }
    }

    fn live_pipe(&mut self) -> Option<&Pipe> {
        if self
            .pipe
            .as_ref()
            .is_some_and(|p| p.is_closed() && !p.is_readable())
        {
            self.pipe = None;
        }
        self.pipe.as_ref()
    }
}

impl Protocol for Pair {
    fn socket_type(&self) -> SocketType {
        SocketType::Pair
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        if self.live_pipe().is_some() {
            debug!(pipe = %pipe.id(), "pair already connected, rejecting pipe");
            return Err(Errno::Inval);
        }
        self.pipe = Some(pipe);
        Ok(())
    }

    fn send(&mut self, msg: Message) -> ProtoResult<()> {
        let pipe = self.live_pipe().ok_or(Errno::Again)?;
        match pipe.try_send(&msg.to_wire()) {
            Ok(()) => Ok(()),
            Err(PipeError::Closed) => {
                self.pipe = None;
                Err(Errno::Again)
            }
            Err(_) => Err(Errno::Again),
        }
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        let pipe = self.live_pipe().ok_or(Errno::Again)?;
        pipe.try_recv().map(Message::new).map_err(|_| Errno::Again)
    }

    fn events(&mut self) -> Events {
        self.live_pipe()
            .map_or(Events::NONE, |p| Events::new(p.is_readable(), p.is_writable()))
    }

    fn close(&mut self) {
        self.pipe = None;
    }
}
