//! Pipe collections shared by the pattern implementations.
//!
//! - fair queueing for inbound messages, honouring RCVPRIO
//! - load balancing for outbound messages, honouring SNDPRIO
//! - distribution to every pipe for PUB, BUS and SURVEYOR
//!
//! Priority 1 is served before priority 16. Pipes of equal priority are
//! served round-robin.

use bytes::Bytes;
use nanolink_core::error::Errno;
use nanolink_core::pipe::{Pipe, PipeError, PipeId};
use nanolink_core::protocol::ProtoResult;
use smallvec::SmallVec;
use tracing::trace;

#[derive(Debug, Default)]
pub(crate) struct PipeSet {
    pipes: Vec<Pipe>,
    next_in: usize,
    next_out: usize,
}

impl PipeSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, pipe: Pipe) {
        self.pipes.push(pipe);
    }

    pub(crate) fn get(&self, id: PipeId) -> Option<&Pipe> {
        self.pipes.iter().find(|p| p.id() == id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pipes.len()
    }

    /// Drop pipes whose link closed and which have nothing left to read.
    pub(crate) fn prune(&mut self) -> SmallVec<[PipeId; 4]> {
        let mut removed = SmallVec::new();
        self.pipes.retain(|p| {
            let dead = p.is_closed() && !p.is_readable();
            if dead {
                trace!(pipe = %p.id(), "pruning closed pipe");
                removed.push(p.id());
            }
            !dead
        });
        if !removed.is_empty() {
            self.next_in = 0;
            self.next_out = 0;
        }
        removed
    }

    pub(crate) fn close_all(&mut self) {
        self.pipes.clear();
    }

    pub(crate) fn readable(&self) -> bool {
        self.pipes.iter().any(Pipe::is_readable)
    }

    pub(crate) fn writable(&self) -> bool {
        self.pipes.iter().any(Pipe::is_writable)
    }

    /// Take the next inbound message from the best-priority readable pipe.
    pub(crate) fn recv_fair(&mut self) -> ProtoResult<(PipeId, Bytes)> {
        self.prune();
        let n = self.pipes.len();
        let best = self
            .pipes
            .iter()
            .filter(|p| p.is_readable())
            .map(Pipe::recv_priority)
            .min()
            .ok_or(Errno::Again)?;

        for step in 0..n {
            let i = (self.next_in + step) % n;
            let pipe = &self.pipes[i];
            if pipe.recv_priority() != best {
                continue;
            }
            if let Ok(msg) = pipe.try_recv() {
                self.next_in = (i + 1) % n;
                return Ok((pipe.id(), msg));
            }
        }
        Err(Errno::Again)
    }

    /// Send to one best-priority writable pipe.
    pub(crate) fn send_lb(&mut self, msg: &Bytes) -> ProtoResult<PipeId> {
        self.prune();
        let n = self.pipes.len();
        let best = self
            .pipes
            .iter()
            .filter(|p| p.is_writable())
            .map(Pipe::send_priority)
            .min()
            .ok_or(Errno::Again)?;

        for step in 0..n {
            let i = (self.next_out + step) % n;
            let pipe = &self.pipes[i];
            if pipe.send_priority() != best {
                continue;
            }
            if pipe.try_send(msg).is_ok() {
                self.next_out = (i + 1) % n;
                return Ok(pipe.id());
            }
        }
        Err(Errno::Again)
    }

    /// Send to every pipe except `except`. Pipes without room drop the message.
    pub(crate) fn distribute(&mut self, msg: &Bytes, except: Option<PipeId>) -> usize {
        self.prune();
        let mut delivered = 0;
        for pipe in &self.pipes {
            if Some(pipe.id()) == except {
                continue;
            }
            match pipe.try_send(msg) {
                Ok(()) => delivered += 1,
                Err(PipeError::Full) => trace!(pipe = %pipe.id(), "pipe full, dropping message"),
                Err(_) => {}
            }
        }
        delivered
    }

    /// Send to one specific pipe. Unknown or full pipes drop the message.
    pub(crate) fn send_to(&mut self, id: PipeId, msg: &Bytes) -> bool {
        match self.get(id) {
            Some(pipe) => pipe.try_send(msg).is_ok(),
            None => {
                trace!(pipe = %id, "no such pipe, dropping message");
                false
            }
        }
    }
}
