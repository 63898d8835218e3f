//! Message pipes.
//!
//! A pipe is one end of a bidirectional link between a socket's protocol and
//! a peer: another socket (inproc) or a carrier connection (tcp, ipc). Each
//! direction is a `flume` channel with byte accounting. A direction accepts a
//! message while its queued byte count is below the receiving side's buffer
//! size; an empty direction accepts any message so oversized messages still
//! make progress.
//!
//! Every transfer and every close notifies the context [`Signal`], which is
//! what blocked sends, receives and polls wait on. Carrier tasks use the
//! async side instead: [`Pipe::send_async`], [`Pipe::recv_async`] and
//! [`Pipe::closed`] wait on flume channels and never block a thread.

use crate::signal::Signal;
use bytes::Bytes;
use flume::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_PIPE_ID: AtomicU32 = AtomicU32::new(1);

/// Pipe identifier, also used as the routing key in request backtraces.
///
/// Keys never have the top bit set, so they cannot be confused with the
/// request id that terminates a backtrace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(u32);

impl PipeId {
    fn next() -> Self {
        loop {
            let id = NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF;
            if id != 0 {
                return Self(id);
            }
        }
    }

    #[inline]
    #[must_use]
    pub const fn key(self) -> u32 {
        self.0
    }

    /// Parse a routing key, rejecting values with the top bit set.
    #[must_use]
    pub const fn from_key(key: u32) -> Option<Self> {
        if key & 0x8000_0000 != 0 || key == 0 {
            None
        } else {
            Some(Self(key))
        }
    }

    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Display for PipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a pipe operation did not transfer a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipeError {
    #[error("pipe buffer full")]
    Full,
    #[error("pipe empty")]
    Empty,
    #[error("pipe closed")]
    Closed,
}

/// Per-end configuration, snapshotted from the owning socket's options.
#[derive(Debug, Clone, Copy)]
pub struct PipeConfig {
    /// SNDPRIO of the owning socket
    pub send_priority: u8,
    /// RCVPRIO of the owning socket
    pub recv_priority: u8,
    /// Bytes that may queue towards this end
    pub inbound_capacity: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            send_priority: 8,
            recv_priority: 8,
            inbound_capacity: 128 * 1024,
        }
    }
}

#[derive(Debug)]
struct Lane {
    queued: AtomicUsize,
    capacity: usize,
    /// Holds at most one token; set whenever the reader frees space.
    space_tx: Sender<()>,
    space_rx: Receiver<()>,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        let (space_tx, space_rx) = flume::bounded(1);
        Self {
            queued: AtomicUsize::new(0),
            capacity,
            space_tx,
            space_rx,
        }
    }

    fn wake_writer(&self) {
        let _ = self.space_tx.try_send(());
    }
}

#[derive(Debug)]
struct Link {
    closed: AtomicBool,
    signal: Arc<Signal>,
    lanes: [Lane; 2],
    /// Dropped on close, which wakes every `closed()` waiter.
    closing: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
}

impl Link {
    fn new(signal: Arc<Signal>, a_to_b: usize, b_to_a: usize) -> Self {
        let (closing, closed_rx) = flume::bounded(1);
        Self {
            closed: AtomicBool::new(false),
            signal,
            lanes: [Lane::new(a_to_b), Lane::new(b_to_a)],
            closing: Mutex::new(Some(closing)),
            closed_rx,
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closing.lock().take();
            for lane in &self.lanes {
                lane.wake_writer();
            }
            self.signal.notify();
        }
    }
}

/// One end of a pipe. Dropping it closes the link.
#[derive(Debug)]
pub struct Pipe {
    id: PipeId,
    link: Arc<Link>,
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    out: usize,
    send_priority: u8,
    recv_priority: u8,
}

/// Create a connected pair of pipe ends sharing `signal`.
#[must_use]
pub fn pair(signal: Arc<Signal>, a: PipeConfig, b: PipeConfig) -> (Pipe, Pipe) {
    let (a_tx, b_rx) = flume::unbounded();
    let (b_tx, a_rx) = flume::unbounded();
    let link = Arc::new(Link::new(signal, b.inbound_capacity, a.inbound_capacity));
    let end_a = Pipe {
        id: PipeId::next(),
        link: Arc::clone(&link),
        tx: a_tx,
        rx: a_rx,
        out: 0,
        send_priority: a.send_priority,
        recv_priority: a.recv_priority,
    };
    let end_b = Pipe {
        id: PipeId::next(),
        link,
        tx: b_tx,
        rx: b_rx,
        out: 1,
        send_priority: b.send_priority,
        recv_priority: b.recv_priority,
    };
    (end_a, end_b)
}

impl Pipe {
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PipeId {
        self.id
    }

    #[inline]
    #[must_use]
    pub const fn send_priority(&self) -> u8 {
        self.send_priority
    }

    #[inline]
    #[must_use]
    pub const fn recv_priority(&self) -> u8 {
        self.recv_priority
    }

    fn out_lane(&self) -> &Lane {
        &self.link.lanes[self.out]
    }

    fn in_lane(&self) -> &Lane {
        &self.link.lanes[1 - self.out]
    }

    /// Queue a message without blocking.
    pub fn try_send(&self, msg: &Bytes) -> Result<(), PipeError> {
        if self.is_closed() {
            return Err(PipeError::Closed);
        }
        let lane = self.out_lane();
        let len = msg.len();
        let mut queued = lane.queued.load(Ordering::Acquire);
        loop {
            if queued > 0 && queued.saturating_add(len) > lane.capacity {
                return Err(PipeError::Full);
            }
            match lane.queued.compare_exchange_weak(
                queued,
                queued + len,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => queued = actual,
            }
        }
        if self.tx.send(msg.clone()).is_err() {
            lane.queued.fetch_sub(len, Ordering::AcqRel);
            self.link.close();
            return Err(PipeError::Closed);
        }
        self.link.signal.notify();
        Ok(())
    }

    /// Queue a message, waiting for buffer space. Fails once the pipe closes.
    ///
    /// Meant for a single writer per direction, i.e. a carrier reader task.
    pub async fn send_async(&self, msg: &Bytes) -> Result<(), PipeError> {
        loop {
            match self.try_send(msg) {
                Err(PipeError::Full) => {}
                other => return other,
            }
            // A token left over from an earlier drain only costs a retry.
            let _ = self.out_lane().space_rx.recv_async().await;
        }
    }

    fn account(&self, msg: &Bytes) {
        let lane = self.in_lane();
        lane.queued.fetch_sub(msg.len(), Ordering::AcqRel);
        lane.wake_writer();
        self.link.signal.notify();
    }

    /// Take the next message without blocking.
    ///
    /// Messages queued before the link closed are still delivered.
    pub fn try_recv(&self) -> Result<Bytes, PipeError> {
        match self.rx.try_recv() {
            Ok(msg) => {
                self.account(&msg);
                Ok(msg)
            }
            Err(TryRecvError::Empty) if !self.is_closed() => Err(PipeError::Empty),
            Err(_) => Err(PipeError::Closed),
        }
    }

    /// Take the next message, waiting until one arrives or the peer end is
    /// dropped. Used by carrier writer tasks together with [`Pipe::closed`].
    pub async fn recv_async(&self) -> Result<Bytes, PipeError> {
        let msg = self.rx.recv_async().await.map_err(|_| PipeError::Closed)?;
        self.account(&msg);
        Ok(msg)
    }

    /// Resolves once the link is closed from either end.
    pub async fn closed(&self) {
        let _ = self.link.closed_rx.recv_async().await;
    }

    /// A message is waiting.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        !self.rx.is_empty()
    }

    /// The outbound direction has room.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        let lane = self.out_lane();
        !self.is_closed() && lane.queued.load(Ordering::Acquire) < lane.capacity
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.link.close();
    }

    /// Handle that closes this link from elsewhere, e.g. an endpoint shutdown.
    #[must_use]
    pub fn closer(&self) -> PipeCloser {
        PipeCloser(Arc::clone(&self.link))
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.link.close();
    }
}

/// Closes a link without owning either end.
#[derive(Debug, Clone)]
pub struct PipeCloser(Arc<Link>);

impl PipeCloser {
    pub fn close(&self) {
        self.0.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::thread;
    use std::time::Duration;

    fn small(capacity: usize) -> PipeConfig {
        PipeConfig {
            inbound_capacity: capacity,
            ..PipeConfig::default()
        }
    }

    #[test]
    fn test_fifo_both_directions() {
        let (a, b) = pair(Arc::new(Signal::new()), PipeConfig::default(), PipeConfig::default());
        a.try_send(&Bytes::from_static(b"one")).unwrap();
        a.try_send(&Bytes::from_static(b"two")).unwrap();
        b.try_send(&Bytes::from_static(b"back")).unwrap();

        assert_eq!(&b.try_recv().unwrap()[..], b"one");
        assert_eq!(&b.try_recv().unwrap()[..], b"two");
        assert_eq!(b.try_recv(), Err(PipeError::Empty));
        assert_eq!(&a.try_recv().unwrap()[..], b"back");
    }

    #[test]
    fn test_capacity_is_receiver_buffer() {
        let (a, b) = pair(Arc::new(Signal::new()), small(1024), small(8));
        // Empty lane accepts an oversized message.
        a.try_send(&Bytes::from(vec![0u8; 32])).unwrap();
        assert!(!a.is_writable());
        assert_eq!(a.try_send(&Bytes::from_static(b"x")), Err(PipeError::Full));

        b.try_recv().unwrap();
        assert!(a.is_writable());
        a.try_send(&Bytes::from_static(b"x")).unwrap();
    }

    #[test]
    fn test_drop_closes_peer_but_drains() {
        let (a, b) = pair(Arc::new(Signal::new()), PipeConfig::default(), PipeConfig::default());
        a.try_send(&Bytes::from_static(b"last")).unwrap();
        drop(a);
        assert!(b.is_closed());
        assert_eq!(&b.try_recv().unwrap()[..], b"last");
        assert_eq!(b.try_recv(), Err(PipeError::Closed));
        assert_eq!(b.try_send(&Bytes::new()), Err(PipeError::Closed));
    }

    #[test]
    fn test_send_async_waits_for_space() {
        let (a, b) = pair(Arc::new(Signal::new()), small(1024), small(4));
        a.try_send(&Bytes::from_static(b"full")).unwrap();

        let writer = thread::spawn(move || {
            let res = block_on(a.send_async(&Bytes::from_static(b"next")));
            (res, a)
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(&b.try_recv().unwrap()[..], b"full");
        let (res, _a) = writer.join().unwrap();
        assert_eq!(res, Ok(()));
        assert_eq!(&block_on(b.recv_async()).unwrap()[..], b"next");
    }

    #[test]
    fn test_send_async_fails_on_close() {
        let (a, b) = pair(Arc::new(Signal::new()), small(1024), small(4));
        a.try_send(&Bytes::from_static(b"full")).unwrap();

        let writer = thread::spawn(move || block_on(a.send_async(&Bytes::from_static(b"more"))));
        thread::sleep(Duration::from_millis(20));
        b.close();
        assert_eq!(writer.join().unwrap(), Err(PipeError::Closed));
    }

    #[test]
    fn test_closed_and_recv_async_after_drop() {
        let (a, b) = pair(Arc::new(Signal::new()), PipeConfig::default(), PipeConfig::default());
        a.try_send(&Bytes::from_static(b"queued")).unwrap();
        drop(a);
        block_on(b.closed());
        assert_eq!(&block_on(b.recv_async()).unwrap()[..], b"queued");
        assert_eq!(block_on(b.recv_async()), Err(PipeError::Closed));
    }

    #[test]
    fn test_closer() {
        let (a, b) = pair(Arc::new(Signal::new()), PipeConfig::default(), PipeConfig::default());
        let closer = b.closer();
        closer.close();
        assert!(a.is_closed());
        assert!(closer.is_closed());
    }

    #[test]
    fn test_pipe_keys() {
        let (a, b) = pair(Arc::new(Signal::new()), PipeConfig::default(), PipeConfig::default());
        assert_ne!(a.id(), b.id());
        assert_eq!(PipeId::from_key(a.id().key()), Some(a.id()));
        assert_eq!(PipeId::from_key(0x8000_0001), None);
    }
}
