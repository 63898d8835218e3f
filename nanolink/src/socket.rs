//! Per-socket state shared between the handle table and the carriers.

use crate::io::Mode;
use hashbrown::HashMap;
use nanolink_core::endpoint::Endpoint;
use nanolink_core::error::{Errno, NanolinkError, Result};
use nanolink_core::message::Message;
use nanolink_core::options::{OptionValue, SocketOptions, DOMAIN, PROTOCOL, SOL_SOCKET};
use nanolink_core::pipe::Pipe;
use nanolink_core::protocol::{
    Engine, EndpointHandle, EndpointKind, Events, PipeHost, ProtoResult, Protocol,
};
use nanolink_core::signal::{Signal, Wake};
use nanolink_core::socket_type::{Domain, SocketType};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

struct Endpoints {
    next_id: i32,
    live: HashMap<i32, Box<dyn EndpointHandle>>,
}

pub(crate) struct SocketCore {
    handle: i32,
    domain: Domain,
    socket_type: SocketType,
    proto: Mutex<Box<dyn Protocol>>,
    options: Mutex<SocketOptions>,
    endpoints: Mutex<Endpoints>,
    closed: AtomicBool,
    signal: Arc<Signal>,
    this: Weak<SocketCore>,
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl SocketCore {
    pub(crate) fn new(
        handle: i32,
        domain: Domain,
        mut proto: Box<dyn Protocol>,
        signal: Arc<Signal>,
    ) -> Arc<Self> {
        let mut options = SocketOptions::default();
        options.socket_name = handle.to_string().into();
        proto.configure(&options);
        let socket_type = proto.socket_type();
        Arc::new_cyclic(|this| Self {
            handle,
            domain,
            socket_type,
            proto: Mutex::new(proto),
            options: Mutex::new(options),
            endpoints: Mutex::new(Endpoints {
                next_id: 1,
                live: HashMap::new(),
            }),
            closed: AtomicBool::new(false),
            signal,
            this: this.clone(),
        })
    }

    #[inline]
    pub(crate) const fn domain(&self) -> Domain {
        self.domain
    }

    #[inline]
    pub(crate) const fn kind(&self) -> SocketType {
        self.socket_type
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Lock the protocol, running any timer work that has come due.
    fn protocol(&self) -> MutexGuard<'_, Box<dyn Protocol>> {
        let mut proto = self.proto.lock();
        let now = Instant::now();
        if proto.next_deadline().is_some_and(|at| at <= now) {
            proto.on_timer(now);
        }
        proto
    }

    /// Current readiness and the next instant it may change on its own.
    pub(crate) fn readiness(&self) -> (Events, Option<Instant>) {
        let mut proto = self.protocol();
        (proto.events(), proto.next_deadline())
    }

    pub(crate) fn add_endpoint(
        &self,
        engine: &dyn Engine,
        kind: EndpointKind,
        endpoint: &Endpoint,
    ) -> ProtoResult<i32> {
        let host: Weak<dyn PipeHost> = self.this.clone();
        // Opening may attach inproc pipes, which takes the protocol lock;
        // the endpoint table is locked only afterwards.
        let handle = engine.open(kind, endpoint, host)?;

        let mut endpoints = self.endpoints.lock();
        if self.is_closed() {
            drop(endpoints);
            handle.shutdown();
            return Err(Errno::BadF);
        }
        let id = endpoints.next_id;
        endpoints.next_id += 1;
        endpoints.live.insert(id, handle);
        debug!(socket = self.handle, endpoint = %endpoint, id, "{:?} endpoint added", kind);
        Ok(id)
    }

    pub(crate) fn remove_endpoint(&self, id: i32) -> bool {
        let Some(handle) = self.endpoints.lock().live.remove(&id) else {
            return false;
        };
        debug!(socket = self.handle, endpoint = %handle.endpoint(), id, "endpoint shut down");
        handle.shutdown();
        true
    }

    /// Close every endpoint and pipe. Blocked callers wake with
    /// `InvalidHandle`.
    pub(crate) fn close(&self) {
        {
            let mut proto = self.proto.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            proto.close();
        }
        let endpoints: Vec<_> = self.endpoints.lock().live.drain().collect();
        for (_, handle) in endpoints {
            handle.shutdown();
        }
        self.signal.notify();
        debug!(socket = self.handle, "socket closed");
    }

    pub(crate) fn set_option(&self, level: i32, option: i32, value: &OptionValue) -> ProtoResult<()> {
        if level == i32::from(self.socket_type.number()) {
            return self.protocol().set_option(option, value);
        }
        let snapshot = {
            let mut options = self.options.lock();
            options.set(level, option, value)?;
            options.clone()
        };
        if level == SOL_SOCKET {
            self.protocol().configure(&snapshot);
        }
        Ok(())
    }

    pub(crate) fn get_option(&self, level: i32, option: i32) -> ProtoResult<OptionValue> {
        match (level, option) {
            (SOL_SOCKET, DOMAIN) => Ok(OptionValue::Int(self.domain.as_i32())),
            (SOL_SOCKET, PROTOCOL) => Ok(OptionValue::Int(i32::from(self.socket_type.number()))),
            _ if level == i32::from(self.socket_type.number()) => {
                self.protocol().get_option(option)
            }
            _ => self.options.lock().get(level, option),
        }
    }

    pub(crate) fn send(&self, msg: Message, mode: Mode) -> Result<()> {
        let timeout = self.options.lock().send_timeout;
        self.run_blocking(mode, timeout, NanolinkError::Send, |proto| proto.send(msg.clone()))
    }

    pub(crate) fn recv(&self, mode: Mode) -> Result<Message> {
        let timeout = self.options.lock().recv_timeout;
        self.run_blocking(mode, timeout, NanolinkError::Recv, |proto| proto.recv())
    }

    /// Retry `op` until it stops reporting `EAGAIN`.
    ///
    /// Waits on the context signal between attempts, waking early for
    /// protocol timers. The protocol lock is never held while waiting.
    fn run_blocking<T>(
        &self,
        mode: Mode,
        timeout: Option<Duration>,
        classify: fn(Errno) -> NanolinkError,
        mut op: impl FnMut(&mut Box<dyn Protocol>) -> ProtoResult<T>,
    ) -> Result<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let seen = self.signal.generation();
            if self.is_closed() {
                return Err(NanolinkError::InvalidHandle(self.handle));
            }
            if self.signal.is_terminated() {
                return Err(NanolinkError::Terminated);
            }

            let timer = {
                let mut proto = self.protocol();
                match op(&mut proto) {
                    Ok(value) => return Ok(value),
                    Err(Errno::Again) => {}
                    Err(errno) => return Err(classify(errno)),
                }
                proto.next_deadline()
            };

            if mode == Mode::DontWait {
                return Err(NanolinkError::WouldBlock);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                trace!(socket = self.handle, "operation timed out");
                return Err(classify(Errno::TimedOut));
            }
            if self.signal.wait(seen, earliest(deadline, timer)) == Wake::Terminated {
                return Err(NanolinkError::Terminated);
            }
        }
    }
}

impl PipeHost for SocketCore {
    fn socket_id(&self) -> i32 {
        self.handle
    }

    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn options(&self) -> SocketOptions {
        self.options.lock().clone()
    }

    fn signal(&self) -> Arc<Signal> {
        Arc::clone(&self.signal)
    }

    fn attach_pipe(&self, pipe: Pipe) -> ProtoResult<()> {
        let result = {
            let mut proto = self.protocol();
            if self.is_closed() {
                return Err(Errno::BadF);
            }
            proto.attach(pipe)
        };
        self.signal.notify();
        trace!(socket = self.handle, ok = result.is_ok(), "pipe attached");
        result
    }
}
