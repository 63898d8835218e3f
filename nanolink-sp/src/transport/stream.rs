//! Shared machinery of the byte-stream carriers (TCP and IPC).
//!
//! ## Runtime
//!
//! Every TCP or IPC endpoint owns one thread running a `compio` runtime:
//!
//! - a bound endpoint accepts in a loop and spawns one task per connection
//! - a connected endpoint dials, serves the connection inline and backs off
//!   between attempts
//!
//! Inside a connection the reader and the writer are two futures selected
//! together; whichever finishes first ends the connection. Shutdown drops
//! the endpoint's stop sender, which every task selects on, so nothing
//! polls a flag.
//!
//! ## Connection lifecycle
//!
//! 1. Both sides send the 8-byte protocol header and read the peer's
//! 2. Incompatible or malformed peers are dropped
//! 3. A pipe pair is created; the socket end goes to the host's protocol
//! 4. Frames are pumped until either the stream or the pipe closes

use crate::codec::{decode_header, encode_frame, encode_header, FrameDecoder, Framing, HEADER_LEN};
use bytes::BytesMut;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use compio::runtime::Runtime;
use flume::{Receiver, Sender};
use futures::{pin_mut, select, select_biased, FutureExt};
use nanolink_core::endpoint::Endpoint;
use nanolink_core::options::SocketOptions;
use nanolink_core::pipe::{self, Pipe, PipeCloser, PipeConfig};
use nanolink_core::protocol::{EndpointHandle, PipeHost};
use nanolink_core::reconnect::ReconnectState;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Upper bound on the protocol header exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 16 * 1024;

/// A listening socket.
pub(crate) trait Acceptor: 'static {
    /// Connected stream; readable and writable through shared references so
    /// the reader and writer of one connection can run side by side.
    type Conn: 'static;

    async fn accept_conn(&self) -> io::Result<Self::Conn>;
}

/// Socket ends of the pipes an endpoint created, closed on shutdown.
#[derive(Default)]
struct Links(Mutex<Vec<PipeCloser>>);

impl Links {
    fn track(&self, closer: PipeCloser) {
        let mut links = self.0.lock();
        links.retain(|link| !link.is_closed());
        links.push(closer);
    }

    fn close_all(&self) {
        for link in self.0.lock().drain(..) {
            link.close();
        }
    }
}

/// Handle for a TCP or IPC bind/connect endpoint.
pub(crate) struct StreamEndpoint {
    endpoint: Endpoint,
    links: Arc<Links>,
    /// Never sent on; dropping it stops every task of the endpoint.
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    /// Socket file to remove on shutdown (IPC binds).
    cleanup: Option<PathBuf>,
}

impl StreamEndpoint {
    pub(crate) fn with_cleanup(mut self, path: PathBuf) -> Self {
        self.cleanup = Some(path);
        self
    }
}

impl EndpointHandle for StreamEndpoint {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn shutdown(mut self: Box<Self>) {
        self.links.close_all();
        drop(self.stop.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("[STREAM] carrier thread for {} panicked", self.endpoint);
            }
        }
        if let Some(path) = self.cleanup.take() {
            let _ = std::fs::remove_file(path);
        }
        debug!("[STREAM] endpoint {} shut down", self.endpoint);
    }
}

/// Start a carrier thread that runs `body` on its own runtime.
///
/// `body` reports through the sender it is handed once it is up; an error
/// there (or a runtime that cannot start) fails the endpoint.
fn spawn_carrier<B, Fut>(thread_name: String, body: B) -> io::Result<JoinHandle<()>>
where
    B: FnOnce(Sender<io::Result<()>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()>,
{
    let (ready_tx, ready_rx) = flume::bounded(1);
    let worker = thread::Builder::new().name(thread_name).spawn(move || match Runtime::new() {
        Ok(runtime) => runtime.block_on(body(ready_tx)),
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    })?;

    let started = ready_rx.recv().unwrap_or_else(|_| {
        Err(io::Error::new(
            io::ErrorKind::Other,
            "carrier thread exited during startup",
        ))
    });
    match started {
        Ok(()) => Ok(worker),
        Err(e) => {
            let _ = worker.join();
            Err(e)
        }
    }
}

/// Run `work` until it finishes or the endpoint is stopped.
async fn until_stopped(work: impl Future<Output = ()>, stopped: Receiver<()>) {
    let work = work.fuse();
    let stopping = stopped.recv_async().fuse();
    pin_mut!(work, stopping);
    select! {
        () = work => {}
        _ = stopping => {}
    }
}

/// Bind with `bind` on a carrier thread and accept connections until
/// shutdown or until the host is gone.
///
/// Bind errors are reported to the caller.
pub(crate) fn listen<A, B, Fut>(
    endpoint: Endpoint,
    framing: Framing,
    host: Weak<dyn PipeHost>,
    bind: B,
) -> io::Result<StreamEndpoint>
where
    A: Acceptor,
    for<'a> &'a A::Conn: AsyncRead + AsyncWrite,
    B: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<A>>,
{
    let links = Arc::new(Links::default());
    let (stop, stopped) = flume::bounded::<()>(1);
    let name = endpoint.to_string();
    let task_links = Arc::clone(&links);

    let worker = spawn_carrier(format!("nanolink-listen {name}"), move |ready| async move {
        let acceptor = match bind().await {
            Ok(acceptor) => acceptor,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        let accepting = accept_loop(acceptor, framing, host, stopped.clone(), task_links);
        until_stopped(accepting, stopped).await;
        trace!("[STREAM] listener on {} exiting", name);
    })?;

    Ok(StreamEndpoint {
        endpoint,
        links,
        stop: Some(stop),
        worker: Some(worker),
        cleanup: None,
    })
}

async fn accept_loop<A>(
    acceptor: A,
    framing: Framing,
    host: Weak<dyn PipeHost>,
    stopped: Receiver<()>,
    links: Arc<Links>,
) where
    A: Acceptor,
    for<'a> &'a A::Conn: AsyncRead + AsyncWrite,
{
    while host.strong_count() > 0 {
        let conn = match acceptor.accept_conn().await {
            Ok(conn) => conn,
            Err(e) => {
                debug!("[STREAM] accept failed: {}", e);
                compio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let session = serve(conn, framing, host.clone(), Arc::clone(&links));
        compio::runtime::spawn(until_stopped(session, stopped.clone())).detach();
    }
}

/// Dial with `connect` on a carrier thread until shutdown, reconnecting
/// after failures and disconnects with the host's backoff settings.
pub(crate) fn dial<C, F, Fut>(
    endpoint: Endpoint,
    framing: Framing,
    host: Weak<dyn PipeHost>,
    connect: F,
) -> io::Result<StreamEndpoint>
where
    C: 'static,
    for<'a> &'a C: AsyncRead + AsyncWrite,
    F: Fn(SocketOptions) -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<C>>,
{
    let links = Arc::new(Links::default());
    let (stop, stopped) = flume::bounded::<()>(1);
    let name = endpoint.to_string();
    let task_links = Arc::clone(&links);

    let worker = spawn_carrier(format!("nanolink-dial {name}"), move |ready| async move {
        let _ = ready.send(Ok(()));
        let dialing = dial_loop(&name, framing, host, connect, task_links);
        until_stopped(dialing, stopped).await;
        trace!("[STREAM] connector for {} exiting", name);
    })?;

    Ok(StreamEndpoint {
        endpoint,
        links,
        stop: Some(stop),
        worker: Some(worker),
        cleanup: None,
    })
}

async fn dial_loop<C, F, Fut>(
    name: &str,
    framing: Framing,
    host: Weak<dyn PipeHost>,
    connect: F,
    links: Arc<Links>,
) where
    for<'a> &'a C: AsyncRead + AsyncWrite,
    F: Fn(SocketOptions) -> Fut,
    Fut: Future<Output = io::Result<C>>,
{
    let mut delays: Option<ReconnectState> = None;
    loop {
        let Some(options) = host.upgrade().map(|host| host.options()) else {
            break;
        };
        let delay = delays.get_or_insert_with(|| ReconnectState::new(&options));
        match connect(options).await {
            Ok(conn) => {
                debug!("[STREAM] connected to {}", name);
                delay.reset();
                serve(conn, framing, host.clone(), Arc::clone(&links)).await;
                trace!("[STREAM] connection to {} ended", name);
            }
            Err(e) => trace!("[STREAM] connect to {} failed: {}", name, e),
        }
        compio::time::sleep(delay.next_delay()).await;
    }
}

/// Handshake, attach a pipe to the host and pump frames until either side
/// closes. Dropping `conn` at the end closes the stream.
async fn serve<C>(conn: C, framing: Framing, host: Weak<dyn PipeHost>, links: Arc<Links>)
where
    for<'a> &'a C: AsyncRead + AsyncWrite,
{
    let Some((pipe, max_size)) = establish(&conn, &host, &links).await else {
        return;
    };
    drop(host);

    let reading = read_frames(&conn, &pipe, framing, max_size).fuse();
    let writing = write_frames(&conn, &pipe, framing).fuse();
    pin_mut!(reading, writing);
    select! {
        () = reading => trace!("[STREAM] inbound side finished"),
        () = writing => trace!("[STREAM] outbound side finished"),
    }
    pipe.close();
}

/// Exchange protocol headers and attach the socket end of a new pipe.
/// Returns the carrier end and the inbound size limit.
async fn establish<S: AsyncRead + AsyncWrite>(
    stream: S,
    host: &Weak<dyn PipeHost>,
    links: &Links,
) -> Option<(Pipe, Option<usize>)> {
    let host = host.upgrade()?;
    match compio::time::timeout(HANDSHAKE_TIMEOUT, handshake(stream, &*host)).await {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => return None,
        Ok(Err(e)) => {
            debug!("[HANDSHAKE] failed: {}", e);
            return None;
        }
        Err(_) => {
            debug!("[HANDSHAKE] timed out");
            return None;
        }
    }

    let options = host.options();
    let carrier = PipeConfig {
        inbound_capacity: options.sndbuf,
        ..PipeConfig::default()
    };
    let (socket_end, carrier_end) = pipe::pair(host.signal(), host.pipe_config(), carrier);
    links.track(socket_end.closer());
    if let Err(errno) = host.attach_pipe(socket_end) {
        debug!("[STREAM] socket {} rejected connection: {}", host.socket_id(), errno);
        return None;
    }
    Some((carrier_end, options.recv_max_size))
}

/// Returns Ok(false) for a well-formed header from an incompatible peer.
async fn handshake<S: AsyncRead + AsyncWrite>(mut stream: S, host: &dyn PipeHost) -> io::Result<bool> {
    let local = host.socket_type();
    let BufResult(res, _) = stream.write_all(encode_header(local.number())).await;
    res?;

    let BufResult(res, header) = stream.read_exact([0u8; HEADER_LEN]).await;
    res?;

    let peer = decode_header(&header).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if !host.accepts_peer(peer) {
        debug!("[HANDSHAKE] {} refusing peer protocol {}", local, peer);
        return Ok(false);
    }
    trace!("[HANDSHAKE] {} accepted peer protocol {}", local, peer);
    Ok(true)
}

async fn read_frames<R: AsyncRead>(
    mut reader: R,
    pipe: &Pipe,
    framing: Framing,
    max_size: Option<usize>,
) {
    let mut decoder = FrameDecoder::new(framing, max_size);
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = Vec::with_capacity(READ_CHUNK);
    loop {
        chunk.clear();
        let BufResult(res, filled) = reader.read(chunk).await;
        chunk = filled;
        match res {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                trace!("[STREAM] read failed: {}", e);
                return;
            }
        }
        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(frame)) => {
                    if pipe.send_async(&frame).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("[STREAM] dropping connection: {}", e);
                    return;
                }
            }
        }
    }
}

async fn write_frames<W: AsyncWrite>(mut writer: W, pipe: &Pipe, framing: Framing) {
    let mut out = BytesMut::new();
    let mut frame = Vec::new();
    loop {
        // Queued messages go out before a close is noticed.
        let msg = select_biased! {
            msg = pipe.recv_async().fuse() => match msg {
                Ok(msg) => msg,
                Err(_) => return,
            },
            () = pipe.closed().fuse() => return,
        };
        out.clear();
        encode_frame(framing, &msg, &mut out);
        frame.clear();
        frame.extend_from_slice(&out);
        let BufResult(res, written) = writer.write_all(frame).await;
        frame = written;
        if let Err(e) = res {
            trace!("[STREAM] write failed: {}", e);
            return;
        }
    }
}
