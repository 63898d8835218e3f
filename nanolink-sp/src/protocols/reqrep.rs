//! REQ/REP: request/reply with request ids and routing backtraces.
//!
//! A request travels as `[backtrace words...] | request id | body`. Every
//! word is 4 bytes big-endian. The request id has the top bit set; routing
//! words pushed by raw REP sockets in devices are pipe keys with the top bit
//! clear. Replies carry the same stack back and each hop pops its own key.

use super::pipes::PipeSet;
use super::{first_word, initial_id, with_word, ID_FLAG, REQ_RESEND_IVL};
use bytes::{Bytes, BytesMut};
use nanolink_core::error::Errno;
use nanolink_core::message::Message;
use nanolink_core::options::{OptionValue, SocketOptions};
use nanolink_core::pipe::{Pipe, PipeId};
use nanolink_core::protocol::{Events, ProtoResult, Protocol};
use nanolink_core::socket_type::SocketType;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const DEFAULT_RESEND_IVL: Duration = Duration::from_millis(60_000);

#[derive(Debug)]
enum RequestState {
    Idle,
    Pending {
        id: u32,
        request: Bytes,
        sent_to: Option<PipeId>,
        resend_at: Option<Instant>,
    },
}

/// REQ socket.
///
/// Cooked: a new request cancels the previous one; `recv` without an
/// outstanding request fails with `EFSM`; replies with a stale id are
/// dropped; unanswered requests are resent every `REQ_RESEND_IVL`.
///
/// Raw: plain load balancing out, fair queueing in, with the leading
/// request id split into the header.
#[derive(Debug)]
pub struct Requester {
    ty: SocketType,
    raw: bool,
    pipes: PipeSet,
    next_id: u32,
    resend_ivl: Duration,
    state: RequestState,
    reply: Option<Message>,
}

impl Requester {
    #[must_use]
    pub fn new(ty: SocketType, raw: bool) -> Self {
        Self {
            ty,
            raw,
            pipes: PipeSet::new(),
            next_id: initial_id(),
            resend_ivl: DEFAULT_RESEND_IVL,
            state: RequestState::Idle,
            reply: None,
        }
    }

    /// Send the outstanding request if it is not in flight on a live pipe.
    fn dispatch(&mut self, now: Instant) {
        if let RequestState::Pending { sent_to: Some(pipe), .. } = self.state {
            self.pipes.prune();
            if self.pipes.get(pipe).is_none() {
                debug!(pipe = %pipe, "request pipe closed, resending");
                if let RequestState::Pending { sent_to, .. } = &mut self.state {
                    *sent_to = None;
                }
            }
        }
        if let RequestState::Pending {
            request,
            sent_to,
            resend_at,
            ..
        } = &mut self.state
        {
            if sent_to.is_some() {
                return;
            }
            if let Ok(pipe) = self.pipes.send_lb(request) {
                trace!(pipe = %pipe, "request sent");
                *sent_to = Some(pipe);
                *resend_at = Some(now + self.resend_ivl);
            }
        }
    }

    /// Pull replies until one matches the outstanding request.
    fn pump(&mut self) {
        let RequestState::Pending { id, .. } = self.state else {
            return;
        };
        if self.reply.is_some() {
            return;
        }
        while let Ok((_, wire)) = self.pipes.recv_fair() {
            if first_word(&wire) == Some(id) {
                self.reply = Some(Message::new(wire.slice(4..)));
                return;
            }
            trace!("dropping reply with stale request id");
        }
    }
}

impl Protocol for Requester {
    fn socket_type(&self) -> SocketType {
        self.ty
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.add(pipe);
        if !self.raw {
            self.dispatch(Instant::now());
        }
        Ok(())
    }

    fn send(&mut self, msg: Message) -> ProtoResult<()> {
        if self.raw {
            return self.pipes.send_lb(&msg.to_wire()).map(|_| ());
        }
        let id = self.next_id | ID_FLAG;
        self.next_id = self.next_id.wrapping_add(1);
        self.state = RequestState::Pending {
            id,
            request: with_word(id, msg.body()),
            sent_to: None,
            resend_at: None,
        };
        self.reply = None;
        self.dispatch(Instant::now());
        Ok(())
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        if self.raw {
            loop {
                let (_, wire) = self.pipes.recv_fair()?;
                match Message::split_wire(wire, 4) {
                    Some(msg) => return Ok(msg),
                    None => trace!("dropping malformed reply"),
                }
            }
        }
        if matches!(self.state, RequestState::Idle) {
            return Err(Errno::Fsm);
        }
        // Space freed on a full lane and pipe closures both notify the
        // signal a blocked recv waits on, so the request goes out from here.
        self.dispatch(Instant::now());
        self.pump();
        let reply = self.reply.take().ok_or(Errno::Again)?;
        self.state = RequestState::Idle;
        Ok(reply)
    }

    fn events(&mut self) -> Events {
        if self.raw {
            self.pipes.prune();
            return Events::new(self.pipes.readable(), self.pipes.writable());
        }
        self.dispatch(Instant::now());
        self.pump();
        Events::new(self.reply.is_some(), true)
    }

    fn close(&mut self) {
        self.pipes.close_all();
        self.state = RequestState::Idle;
        self.reply = None;
    }

    fn set_option(&mut self, option: i32, value: &OptionValue) -> ProtoResult<()> {
        match option {
            REQ_RESEND_IVL => {
                let ms = value.as_int()?;
                if ms <= 0 {
                    return Err(Errno::Inval);
                }
                self.resend_ivl = Duration::from_millis(ms as u64);
                Ok(())
            }
            _ => Err(Errno::NoProtoOpt),
        }
    }

    fn get_option(&self, option: i32) -> ProtoResult<OptionValue> {
        match option {
            REQ_RESEND_IVL => Ok(OptionValue::Int(
                i32::try_from(self.resend_ivl.as_millis()).unwrap_or(i32::MAX),
            )),
            _ => Err(Errno::NoProtoOpt),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            RequestState::Pending { resend_at, .. } if !self.raw => resend_at,
            _ => None,
        }
    }

    fn on_timer(&mut self, now: Instant) {
        if let RequestState::Pending {
            sent_to, resend_at, ..
        } = &mut self.state
        {
            if resend_at.is_some_and(|at| at <= now) {
                debug!("request timed out, resending");
                *sent_to = None;
                *resend_at = None;
                self.dispatch(now);
            }
        }
    }
}

/// Split `[routing words...] | id` off the front of a request.
///
/// Returns the backtrace (including the id word) and the body, or `None` when
/// no id word is found within `max_hops` words.
pub(crate) fn split_backtrace(wire: &Bytes, max_hops: usize) -> Option<(Bytes, Bytes)> {
    let mut offset = 0;
    for _ in 0..max_hops {
        let word = first_word(&wire[offset..])?;
        offset += 4;
        if word & ID_FLAG != 0 {
            return Some((wire.slice(..offset), wire.slice(offset..)));
        }
    }
    None
}

/// REP and RESPONDENT socket.
///
/// Cooked: `recv` remembers the backtrace of the request it returns, and the
/// next `send` routes the reply back along it. `send` without a pending
/// request fails with `EFSM`. Receiving a new request discards any unanswered
/// one.
///
/// Raw: `recv` returns the backtrace, prefixed with the originating pipe key,
/// as header. `send` pops the leading pipe key and forwards the rest to that
/// pipe, dropping the message if the pipe is gone.
#[derive(Debug)]
pub struct Responder {
    ty: SocketType,
    raw: bool,
    pipes: PipeSet,
    max_ttl: usize,
    backtrace: Option<(PipeId, Bytes)>,
}

impl Responder {
    #[must_use]
    pub fn new(ty: SocketType, raw: bool) -> Self {
        Self {
            ty,
            raw,
            pipes: PipeSet::new(),
            max_ttl: usize::from(SocketOptions::default().max_ttl),
            backtrace: None,
        }
    }

    fn next_request(&mut self) -> ProtoResult<(PipeId, Bytes, Bytes)> {
        loop {
            let (pipe, wire) = self.pipes.recv_fair()?;
            match split_backtrace(&wire, self.max_ttl) {
                Some((backtrace, body)) => return Ok((pipe, backtrace, body)),
                None => trace!(pipe = %pipe, "dropping request without id or over ttl"),
            }
        }
    }
}

impl Protocol for Responder {
    fn socket_type(&self) -> SocketType {
        self.ty
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn attach(&mut self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.add(pipe);
        Ok(())
    }

    fn send(&mut self, msg: Message) -> ProtoResult<()> {
        if self.raw {
            let wire = msg.to_wire();
            let Some(pipe) = first_word(&wire).and_then(PipeId::from_key) else {
                trace!("dropping reply without routing key");
                return Ok(());
            };
            self.pipes.send_to(pipe, &wire.slice(4..));
            return Ok(());
        }
        let (pipe, backtrace) = self.backtrace.take().ok_or(Errno::Fsm)?;
        let mut reply = BytesMut::with_capacity(backtrace.len() + msg.len());
        reply.extend_from_slice(&backtrace);
        reply.extend_from_slice(msg.body());
        self.pipes.send_to(pipe, &reply.freeze());
        Ok(())
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        let (pipe, backtrace, body) = self.next_request()?;
        if self.raw {
            let mut header = BytesMut::with_capacity(4 + backtrace.len());
            header.extend_from_slice(&pipe.to_be_bytes());
            header.extend_from_slice(&backtrace);
            return Ok(Message::with_header(header.freeze(), body));
        }
        self.backtrace = Some((pipe, backtrace));
        Ok(Message::new(body))
    }

    fn events(&mut self) -> Events {
        self.pipes.prune();
        let writable = self.raw || self.backtrace.is_some();
        Events::new(self.pipes.readable(), writable)
    }

    fn close(&mut self) {
        self.pipes.close_all();
        self.backtrace = None;
    }

    fn configure(&mut self, options: &SocketOptions) {
        self.max_ttl = usize::from(options.max_ttl);
    }
}
