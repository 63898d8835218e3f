//! PUSH/PULL: load-balanced pipeline.

use super::pipes::PipeSet;
use nanolink_core::error::Errno;
use nanolink_core::message::Message;
use nanolink_core::pipe::Pipe;
use nanolink_core::protocol::{Events, ProtoResult, Protocol};
use nanolink_core::socket_type::SocketType;

/// PUSH: each message goes to exactly one downstream pipe.
#[derive(Debug)]
pub struct Push {
    raw: bool,
    pipes: PipeSet,
}

impl Push {
    #[must_use]
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pipes: PipeSet::new(),
        }
    }
}

impl Protocol for Push {
    fn socket_type(&self) -> SocketType {
        SocketType::Push
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.add(pipe);
        Ok(())
    }

    fn send(&mut self, msg: Message) -> ProtoResult<()> {
        self.pipes.send_lb(&msg.to_wire()).map(|_| ())
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        Err(Errno::NotSup)
    }

    fn events(&mut self) -> Events {
        self.pipes.prune();
        Events::new(false, self.pipes.writable())
    }

    fn close(&mut self) {
        self.pipes.close_all();
    }
}

/// PULL: fair-queues messages from all upstream pipes.
#[derive(Debug)]
pub struct Pull {
    raw: bool,
    pipes: PipeSet,
}

impl Pull {
    #[must_use]
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pipes: PipeSet::new(),
        }
    }
}

impl Protocol for Pull {
    fn socket_type(&self) -> SocketType {
        SocketType::Pull
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.add(pipe);
        Ok(())
    }

    fn send(&mut self, _msg: Message) -> ProtoResult<()> {
        Err(Errno::NotSup)
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        self.pipes.recv_fair().map(|(_, body)| Message::new(body))
    }

    fn events(&mut self) -> Events {
        Events::new(self.pipes.readable(), false)
    }

    fn close(&mut self) {
        self.pipes.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::testing::link;
    use bytes::Bytes;

    #[test]
    fn test_push_balances() {
        let mut push = Push::new(false);
        let (a, a_peer) = link();
        let (b, b_peer) = link();
        push.attach(a).unwrap();
        push.attach(b).unwrap();

        push.send(Message::new(Bytes::from_static(b"1"))).unwrap();
        push.send(Message::new(Bytes::from_static(b"2"))).unwrap();
        assert_eq!(&a_peer.try_recv().unwrap()[..], b"1");
        assert_eq!(&b_peer.try_recv().unwrap()[..], b"2");
    }

    #[test]
    fn test_push_without_peers_would_block() {
        let mut push = Push::new(false);
        assert_eq!(push.send(Message::default()), Err(Errno::Again));
        assert_eq!(push.events(), Events::NONE);
    }

    #[test]
    fn test_pull_receives() {
        let mut pull = Pull::new(false);
        let (ours, theirs) = link();
        pull.attach(ours).unwrap();
        theirs.try_send(&Bytes::from_static(b"job")).unwrap();

        assert_eq!(pull.events(), Events::READ);
        assert_eq!(&pull.recv().unwrap().body()[..], b"job");
        assert_eq!(pull.send(Message::default()), Err(Errno::NotSup));
    }
}
