//! Contexts and the socket handle table.
//!
//! A [`Context`] owns a table of open sockets, the readiness signal they
//! share and the protocol engine that creates their state machines and
//! carriers. Handles are small integers that encode a slot and a generation
//! drawn from one process-wide allocator, so a handle names at most one live
//! socket across all contexts. Once closed, every use of it reports
//! `InvalidHandle` until the slot's generation wraps, and a context reports
//! `InvalidHandle` for handles that belong to another context.

use crate::socket::SocketCore;
use nanolink_core::endpoint::Endpoint;
use nanolink_core::error::{Errno, NanolinkError, Result};
use nanolink_core::options::OptionValue;
use nanolink_core::protocol::{Engine, EndpointKind};
use nanolink_core::signal::Signal;
use nanolink_core::socket_type::Domain;
use nanolink_sp::SpEngine;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

const INDEX_BITS: u32 = 12;
const INDEX_MASK: i32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = 0x7FFFF;

/// Largest number of sockets the process can hold open at once.
pub const MAX_SOCKETS: usize = INDEX_MASK as usize;

/// Context configuration.
///
/// # Examples
///
/// ```
/// use nanolink::{Context, ContextConfig};
///
/// let ctx = Context::with_config(ContextConfig::default().with_max_sockets(16));
/// assert!(!ctx.is_terminated());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Upper bound on concurrently open sockets, at most [`MAX_SOCKETS`]
    pub max_sockets: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_sockets: MAX_SOCKETS,
        }
    }
}

impl ContextConfig {
    /// Limit the number of open sockets. Values above [`MAX_SOCKETS`] are clamped.
    #[must_use]
    pub fn with_max_sockets(mut self, max: usize) -> Self {
        self.max_sockets = max.min(MAX_SOCKETS);
        self
    }
}

/// Slot and generation allocator shared by every context in the process.
///
/// A handle names at most one live socket process-wide, so a handle from
/// one context is never a valid handle in another.
#[derive(Default)]
struct SlotAllocator {
    generations: Vec<u32>,
    free: Vec<usize>,
}

static SLOTS: Lazy<Mutex<SlotAllocator>> = Lazy::new(|| Mutex::new(SlotAllocator::default()));

impl SlotAllocator {
    fn encode(index: usize, generation: u32) -> i32 {
        (((generation & GENERATION_MASK) as i32) << INDEX_BITS) | index as i32
    }

    fn acquire(&mut self) -> Option<i32> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.generations.len() < MAX_SOCKETS => {
                self.generations.push(0);
                self.generations.len() - 1
            }
            None => return None,
        };
        Some(Self::encode(index, self.generations[index]))
    }

    fn release(&mut self, handle: i32) {
        let index = (handle & INDEX_MASK) as usize;
        if let Some(generation) = self.generations.get_mut(index) {
            *generation = generation.wrapping_add(1);
            self.free.push(index);
        }
    }
}

/// The sockets one context owns, keyed by their process-wide handle.
#[derive(Default)]
struct HandleTable {
    sockets: HashMap<i32, Arc<SocketCore>>,
}

impl HandleTable {
    fn insert_with(
        &mut self,
        limit: usize,
        make: impl FnOnce(i32) -> Arc<SocketCore>,
    ) -> std::result::Result<i32, Errno> {
        if self.sockets.len() >= limit {
            return Err(Errno::MFile);
        }
        let handle = SLOTS.lock().acquire().ok_or(Errno::MFile)?;
        self.sockets.insert(handle, make(handle));
        Ok(handle)
    }

    fn get(&self, handle: i32) -> Option<&Arc<SocketCore>> {
        self.sockets.get(&handle)
    }

    fn remove(&mut self, handle: i32) -> Option<Arc<SocketCore>> {
        let socket = self.sockets.remove(&handle)?;
        SLOTS.lock().release(handle);
        Some(socket)
    }

    fn drain(&mut self) -> Vec<Arc<SocketCore>> {
        let mut slots = SLOTS.lock();
        self.sockets
            .drain()
            .map(|(handle, socket)| {
                slots.release(handle);
                socket
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.sockets.len()
    }
}

pub(crate) struct ContextInner {
    engine: Arc<dyn Engine>,
    table: RwLock<HandleTable>,
    signal: Arc<Signal>,
    config: ContextConfig,
}

impl ContextInner {
    fn terminate(&self) {
        if self.signal.terminate() {
            self.engine.terminate();
            info!("context terminated");
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.terminate();
        for socket in self.table.get_mut().drain() {
            socket.close();
        }
    }
}

/// An independent set of sockets with its own handle table, inproc namespace
/// and termination signal.
///
/// Cloning a `Context` yields another handle to the same sockets. The last
/// clone to go away terminates the context and closes whatever is still open.
///
/// # Examples
///
/// ```
/// use nanolink::{Context, AF_SP, PAIR};
///
/// let ctx = Context::new();
/// let a = ctx.socket(AF_SP, PAIR).unwrap();
/// let b = ctx.socket(AF_SP, PAIR).unwrap();
/// ctx.bind(a, "inproc://doc").unwrap();
/// ctx.connect(b, "inproc://doc").unwrap();
///
/// ctx.send(a, b"ping", 4, 0).unwrap();
/// assert_eq!(ctx.recv(b, 16, 0).unwrap(), b"ping");
/// ```
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sockets", &self.inner.table.read().len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Context backed by the scalability-protocol engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Context with explicit limits.
    #[must_use]
    pub fn with_config(config: ContextConfig) -> Self {
        Self::with_engine(Arc::new(SpEngine::new()), config)
    }

    /// Context backed by a custom protocol engine.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn Engine>, config: ContextConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                engine,
                table: RwLock::new(HandleTable::default()),
                signal: Arc::new(Signal::new()),
                config: config.with_max_sockets(config.max_sockets),
            }),
        }
    }

    pub(crate) fn signal(&self) -> &Arc<Signal> {
        &self.inner.signal
    }

    /// Resolve a handle. Stale handles win over termination.
    pub(crate) fn lookup(&self, handle: i32) -> Result<Arc<SocketCore>> {
        let socket = self
            .inner
            .table
            .read()
            .get(handle)
            .cloned()
            .ok_or(NanolinkError::InvalidHandle(handle))?;
        if self.is_terminated() {
            return Err(NanolinkError::Terminated);
        }
        Ok(socket)
    }

    /// Create a socket for a `(domain, protocol)` pair.
    pub fn socket(&self, domain: i32, protocol: i32) -> Result<i32> {
        if self.is_terminated() {
            return Err(NanolinkError::SocketCreation(Errno::Term));
        }
        let parsed = Domain::from_i32(domain).ok_or(NanolinkError::SocketCreation(Errno::AfNoSupport))?;
        let proto = self
            .inner
            .engine
            .create_protocol(domain, protocol)
            .map_err(NanolinkError::SocketCreation)?;

        let signal = Arc::clone(&self.inner.signal);
        let handle = self
            .inner
            .table
            .write()
            .insert_with(self.inner.config.max_sockets, |handle| {
                SocketCore::new(handle, parsed, proto, signal)
            })
            .map_err(NanolinkError::SocketCreation)?;
        debug!(socket = handle, domain, protocol, "socket created");
        Ok(handle)
    }

    fn add_endpoint(&self, handle: i32, address: &str, kind: EndpointKind) -> Result<i32> {
        let socket = self.lookup(handle)?;
        let endpoint =
            Endpoint::parse(address).map_err(|e| NanolinkError::address(address, e.errno()))?;
        socket
            .add_endpoint(&*self.inner.engine, kind, &endpoint)
            .map_err(|errno| match (errno, kind) {
                (Errno::BadF, _) => NanolinkError::InvalidHandle(handle),
                (_, EndpointKind::Bind) => NanolinkError::bind(address, errno),
                (_, EndpointKind::Connect) => NanolinkError::connect(address, errno),
            })
    }

    /// Add a local endpoint. Returns the endpoint id for [`Context::shutdown`].
    pub fn bind(&self, handle: i32, address: &str) -> Result<i32> {
        self.add_endpoint(handle, address, EndpointKind::Bind)
    }

    /// Add a remote endpoint. Never waits for the connection to be
    /// established; the carrier keeps reconnecting in the background.
    pub fn connect(&self, handle: i32, address: &str) -> Result<i32> {
        self.add_endpoint(handle, address, EndpointKind::Connect)
    }

    /// Remove one endpoint, leaving the socket and its other endpoints open.
    pub fn shutdown(&self, handle: i32, endpoint: i32) -> Result<()> {
        let socket = self.lookup(handle)?;
        if socket.remove_endpoint(endpoint) {
            Ok(())
        } else {
            Err(NanolinkError::InvalidConnection {
                socket: handle,
                endpoint,
            })
        }
    }

    /// Close a socket and release its handle.
    ///
    /// Allowed after termination so that handles can still be released.
    pub fn close(&self, handle: i32) -> Result<()> {
        let socket = self
            .inner
            .table
            .write()
            .remove(handle)
            .ok_or(NanolinkError::InvalidHandle(handle))?;
        socket.close();
        Ok(())
    }

    /// Read an integer option. Byte-string options fail with `EINVAL`; use
    /// [`Context::get_option_value`] for those.
    pub fn get_option(&self, handle: i32, level: i32, option: i32) -> Result<i32> {
        self.get_option_value(handle, level, option)?
            .as_int()
            .map_err(|errno| NanolinkError::option(level, option, errno))
    }

    /// Read an option of any kind.
    pub fn get_option_value(&self, handle: i32, level: i32, option: i32) -> Result<OptionValue> {
        self.lookup(handle)?
            .get_option(level, option)
            .map_err(|errno| NanolinkError::option(level, option, errno))
    }

    /// Set an option.
    ///
    /// ```
    /// use nanolink::{Context, AF_SP, SUB, SUB_SUBSCRIBE, RCVTIMEO, SOL_SOCKET};
    ///
    /// let ctx = Context::new();
    /// let s = ctx.socket(AF_SP, SUB).unwrap();
    /// ctx.set_option(s, SUB, SUB_SUBSCRIBE, "news.").unwrap();
    /// ctx.set_option(s, SOL_SOCKET, RCVTIMEO, 100).unwrap();
    /// assert_eq!(ctx.get_option(s, SOL_SOCKET, RCVTIMEO).unwrap(), 100);
    /// ```
    pub fn set_option(
        &self,
        handle: i32,
        level: i32,
        option: i32,
        value: impl Into<OptionValue>,
    ) -> Result<()> {
        self.lookup(handle)?
            .set_option(level, option, &value.into())
            .map_err(|errno| NanolinkError::option(level, option, errno))
    }

    /// Terminate the context. Every blocked call fails with `Terminated`, as
    /// does every later operation other than [`Context::close`]. Idempotent.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    /// Whether [`Context::terminate`] has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.signal.is_terminated()
    }
}
