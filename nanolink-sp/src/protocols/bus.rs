//! BUS: every message goes to every other node.
//!
//! Raw BUS sockets tag received messages with the originating pipe key as
//! header. Sending a message with such a header skips that pipe, which is
//! what lets a loopback device relay between peers without echoing.

use super::first_word;
use super::pipes::PipeSet;
use bytes::Bytes;
use nanolink_core::message::Message;
use nanolink_core::pipe::{Pipe, PipeId};
use nanolink_core::protocol::{Events, ProtoResult, Protocol};
use nanolink_core::socket_type::SocketType;

#[derive(Debug)]
pub struct Bus {
    raw: bool,
    pipes: PipeSet,
}

impl Bus {
    #[must_use]
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pipes: PipeSet::new(),
        }
    }
}

impl Protocol for Bus {
    fn socket_type(&self) -> SocketType {
        SocketType::Bus
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.add(pipe);
        Ok(())
    }

    fn send(&mut self, msg: Message) -> ProtoResult<()> {
        // A raw message handed in as one buffer carries the pipe key in front.
        let msg = if self.raw && msg.header().is_empty() {
            Message::split_wire(msg.body().clone(), 4).unwrap_or(msg)
        } else {
            msg
        };
        let except = if self.raw {
            first_word(msg.header()).and_then(PipeId::from_key)
        } else {
            None
        };
        self.pipes.distribute(msg.body(), except);
        Ok(())
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        let (pipe, body) = self.pipes.recv_fair()?;
        if self.raw {
            Ok(Message::with_header(
                Bytes::copy_from_slice(&pipe.to_be_bytes()),
                body,
            ))
        } else {
            Ok(Message::new(body))
        }
    }

    fn events(&mut self) -> Events {
        Events::new(self.pipes.readable(), true)
    }

    fn close(&mut self) {
        self.pipes.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::testing::link;

    #[test]
    fn test_cooked_bus_broadcasts() {
        let mut bus = Bus::new(false);
        let (a, a_peer) = link();
        let (b, b_peer) = link();
        bus.attach(a).unwrap();
        bus.attach(b).unwrap();

        bus.send(Message::new(Bytes::from_static(b"hello"))).unwrap();
        assert!(a_peer.try_recv().is_ok());
        assert!(b_peer.try_recv().is_ok());
    }

    #[test]
    fn test_raw_bus_skips_origin() {
        let mut bus = Bus::new(true);
        let (a, a_peer) = link();
        let (b, b_peer) = link();
        bus.attach(a).unwrap();
        bus.attach(b).unwrap();

        a_peer.try_send(&Bytes::from_static(b"from a")).unwrap();
        let msg = bus.recv().unwrap();
        assert_eq!(msg.header().len(), 4);
        assert_eq!(&msg.body()[..], b"from a");

        bus.send(msg).unwrap();
        assert!(a_peer.try_recv().is_err());
        assert_eq!(&b_peer.try_recv().unwrap()[..], b"from a");
    }

    #[test]
    fn test_raw_bus_splits_flat_buffer() {
        let mut bus = Bus::new(true);
        let (a, a_peer) = link();
        let (b, b_peer) = link();
        bus.attach(a).unwrap();
        bus.attach(b).unwrap();

        a_peer.try_send(&Bytes::from_static(b"ping")).unwrap();
        let wire = bus.recv().unwrap().to_wire();
        bus.send(Message::new(wire)).unwrap();
        assert!(a_peer.try_recv().is_err());
        assert_eq!(&b_peer.try_recv().unwrap()[..], b"ping");
    }
}
