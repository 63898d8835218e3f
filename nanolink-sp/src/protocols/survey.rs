//! SURVEYOR: ask every respondent, collect answers until a deadline.
//!
//! Respondents are served by [`super::Responder`]; only the surveyor side
//! lives here.

use super::pipes::PipeSet;
use super::{first_word, initial_id, with_word, ID_FLAG, SURVEYOR_DEADLINE};
use nanolink_core::error::Errno;
use nanolink_core::message::Message;
use nanolink_core::options::OptionValue;
use nanolink_core::pipe::Pipe;
use nanolink_core::protocol::{Events, ProtoResult, Protocol};
use nanolink_core::socket_type::SocketType;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const DEFAULT_DEADLINE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurveyState {
    Idle,
    Active { id: u32, deadline: Instant },
    /// Deadline passed; the next `recv` reports `ETIMEDOUT`.
    Expired,
}

/// SURVEYOR socket.
///
/// Cooked: `send` starts a survey and cancels the previous one. `recv`
/// returns responses carrying the current survey id until the deadline, then
/// fails with `ETIMEDOUT` once and goes idle. `recv` with no survey fails with
/// `EFSM`.
///
/// Raw: messages are distributed as given; received messages have their
/// survey id split into the header.
#[derive(Debug)]
pub struct Surveyor {
    raw: bool,
    pipes: PipeSet,
    next_id: u32,
    deadline: Duration,
    state: SurveyState,
    pending: Option<Message>,
}

impl Surveyor {
    #[must_use]
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pipes: PipeSet::new(),
            next_id: initial_id(),
            deadline: DEFAULT_DEADLINE,
            state: SurveyState::Idle,
            pending: None,
        }
    }

    fn expire(&mut self, now: Instant) {
        if let SurveyState::Active { deadline, .. } = self.state {
            if deadline <= now {
                debug!("survey deadline passed");
                self.state = SurveyState::Expired;
                self.pending = None;
            }
        }
    }

    fn pump(&mut self) {
        let SurveyState::Active { id, .. } = self.state else {
            return;
        };
        if self.pending.is_some() {
            return;
        }
        while let Ok((_, wire)) = self.pipes.recv_fair() {
            if first_word(&wire) == Some(id) {
                self.pending = Some(Message::new(wire.slice(4..)));
                return;
            }
            trace!("dropping response to an old survey");
        }
    }
}

impl Protocol for Surveyor {
    fn socket_type(&self) -> SocketType {
        SocketType::Surveyor
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
            self.pipes.distribute(&msg.to_wire(), None);
            return Ok(());
        }
        let id = self.next_id | ID_FLAG;
        self.next_id = self.next_id.wrapping_add(1);
        let delivered = self.pipes.distribute(&with_word(id, msg.body()), None);
        trace!(delivered, "survey sent");
        self.state = SurveyState::Active {
            id,
            deadline: Instant::now() + self.deadline,
        };
        self.pending = None;
        Ok(())
    }

    fn recv(&mut self) -> ProtoResult<Message> {
        if self.raw {
            loop {
                let (_, wire) = self.pipes.recv_fair()?;
                match Message::split_wire(wire, 4) {
                    Some(msg) => return Ok(msg),
                    None => trace!("dropping malformed response"),
                }
            }
        }
        self.expire(Instant::now());
        match self.state {
            SurveyState::Idle => Err(Errno::Fsm),
            SurveyState::Expired => {
                self.state = SurveyState::Idle;
                Err(Errno::TimedOut)
            }
            SurveyState::Active { .. } => {
                self.pump();
                self.pending.take().ok_or(Errno::Again)
            }
        }
    }

    fn events(&mut self) -> Events {
        if self.raw {
            self.pipes.prune();
            return Events::new(self.pipes.readable(), true);
        }
        self.expire(Instant::now());
        self.pump();
        let readable = self.pending.is_some() || self.state == SurveyState::Expired;
        Events::new(readable, true)
    }

    fn close(&mut self) {
        self.pipes.close_all();
        self.state = SurveyState::Idle;
        self.pending = None;
    }

    fn set_option(&mut self, option: i32, value: &OptionValue) -> ProtoResult<()> {
        match option {
            SURVEYOR_DEADLINE => {
                let ms = value.as_int()?;
                if ms <= 0 {
                    return Err(Errno::Inval);
                }
                self.deadline = Duration::from_millis(ms as u64);
                Ok(())
            }
            _ => Err(Errno::NoProtoOpt),
        }
    }

    fn get_option(&self, option: i32) -> ProtoResult<OptionValue> {
        match option {
            SURVEYOR_DEADLINE => Ok(OptionValue::Int(
                i32::try_from(self.deadline.as_millis()).unwrap_or(i32::MAX),
            )),
            _ => Err(Errno::NoProtoOpt),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SurveyState::Active { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    fn on_timer(&mut self, now: Instant) {
        self.expire(now);
    }
}
