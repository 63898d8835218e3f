//! PUB/SUB: one-to-many distribution with prefix filtering on the subscriber.

use super::pipes::PipeSet;
use super::{SUB_SUBSCRIBE, SUB_UNSUBSCRIBE};
use nanolink_core::error::Errno;
use nanolink_core::message::Message;
use nanolink_core::options::OptionValue;
use nanolink_core::pipe::Pipe;
use nanolink_core::protocol::{Events, ProtoResult, Protocol};
use nanolink_core::socket_type::SocketType;
use nanolink_core::subscription::SubscriptionTrie;
use tracing::trace;

/// PUB: every message goes to every connected subscriber. Never blocks;
/// subscribers without buffer space miss the message.
#[derive(Debug)]
pub struct Publisher {
    raw: bool,
    pipes: PipeSet,
}

impl Publisher {
    #[must_use]
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pipes: PipeSet::new(),
        }
    }
}

impl Protocol for Publisher {
    fn socket_type(&self) -> SocketType {
        SocketType::Pub
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.add(pipe);
        Ok(())
    }

    fn send(&mut self, msg: Message) -> ProtoResult<()> {
        let delivered = self.pipes.distribute(&msg.to_wire(), None);
        trace!(delivered, "published message");
        Ok(())
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        Err(Errno::NotSup)
    }

    fn events(&mut self) -> Events {
        Events::WRITE
    }

    fn close(&mut self) {
        self.pipes.close_all();
    }
}

/// SUB: receives published messages whose body starts with a subscribed
/// prefix. With no subscriptions nothing is delivered.
#[derive(Debug)]
pub struct Subscriber {
    raw: bool,
    pipes: PipeSet,
    subscriptions: SubscriptionTrie,
    pending: Option<Message>,
}

impl Subscriber {
    #[must_use]
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pipes: PipeSet::new(),
            subscriptions: SubscriptionTrie::new(),
            pending: None,
        }
    }

    /// Pull inbound messages until one passes the filter.
    fn pump(&mut self) {
        if let Some(msg) = &self.pending {
            if self.subscriptions.matches(msg.body()) {
                return;
            }
            self.pending = None;
        }
        while let Ok((_, body)) = self.pipes.recv_fair() {
            if self.subscriptions.matches(&body) {
                self.pending = Some(Message::new(body));
                return;
            }
            trace!(len = body.len(), "no matching subscription, dropping message");
        }
    }
}

impl Protocol for Subscriber {
    fn socket_type(&self) -> SocketType {
        SocketType::Sub
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
        self.pump();
        self.pending.take().ok_or(Errno::Again)
    }

    fn events(&mut self) -> Events {
        self.pump();
        Events::new(self.pending.is_some(), false)
    }

    fn close(&mut self) {
        self.pipes.close_all();
        self.pending = None;
    }

    fn set_option(&mut self, option: i32, value: &OptionValue) -> ProtoResult<()> {
        let prefix = value.as_bytes()?;
        match option {
            SUB_SUBSCRIBE => {
                self.subscriptions.subscribe(prefix.clone());
                Ok(())
            }
            SUB_UNSUBSCRIBE => {
                if self.subscriptions.unsubscribe(prefix) {
                    Ok(())
                } else {
                    Err(Errno::Inval)
                }
            }
            _ => Err(Errno::NoProtoOpt),
        }
    }
}
