//! TCP and IPC carriers driven through `SpEngine` with a minimal host.

use bytes::Bytes;
use nanolink_core::endpoint::Endpoint;
use nanolink_core::error::Errno;
use nanolink_core::options::SocketOptions;
use nanolink_core::pipe::Pipe;
use nanolink_core::protocol::{Engine, EndpointKind, PipeHost, ProtoResult};
use nanolink_core::signal::Signal;
use nanolink_core::socket_type::SocketType;
use nanolink_sp::SpEngine;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

struct Host {
    ty: SocketType,
    signal: Arc<Signal>,
    pipes: Mutex<Vec<Pipe>>,
}

impl Host {
    fn new(ty: SocketType, signal: &Arc<Signal>) -> Arc<Self> {
        Arc::new(Self {
            ty,
            signal: Arc::clone(signal),
            pipes: Mutex::new(Vec::new()),
        })
    }

    fn weak(self: &Arc<Self>) -> Weak<dyn PipeHost> {
        let host: Arc<dyn PipeHost> = Arc::clone(self) as Arc<dyn PipeHost>;
        Arc::downgrade(&host)
    }

    /// Wait until `check` holds for the attached pipes.
    fn wait_for(&self, check: impl Fn(&[Pipe]) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let seen = self.signal.generation();
            if check(self.pipes.lock().as_slice()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.signal.wait(seen, Some(Instant::now() + Duration::from_millis(50)));
        }
    }
}

impl PipeHost for Host {
    fn socket_id(&self) -> i32 {
        1
    }

    fn socket_type(&self) -> SocketType {
        self.ty
    }

    fn options(&self) -> SocketOptions {
        SocketOptions::default().with_reconnect_ivl(Duration::from_millis(20))
    }

    fn signal(&self) -> Arc<Signal> {
        Arc::clone(&self.signal)
    }

    fn attach_pipe(&self, pipe: Pipe) -> ProtoResult<()> {
        self.pipes.lock().push(pipe);
        self.signal.notify();
        Ok(())
    }
}

fn exchange(engine: &SpEngine, endpoint: &Endpoint) {
    let signal = Arc::new(Signal::new());
    let server = Host::new(SocketType::Pair, &signal);
    let client = Host::new(SocketType::Pair, &signal);

    let bound = engine.open(EndpointKind::Bind, endpoint, server.weak()).unwrap();
    let connected = engine.open(EndpointKind::Connect, endpoint, client.weak()).unwrap();

    assert!(server.wait_for(|pipes| pipes.len() == 1));
    assert!(client.wait_for(|pipes| pipes.len() == 1));

    client.pipes.lock()[0]
        .try_send(&Bytes::from_static(b"over the wire"))
        .unwrap();
    assert!(server.wait_for(|pipes| pipes[0].is_readable()));
    assert_eq!(&server.pipes.lock()[0].try_recv().unwrap()[..], b"over the wire");

    server.pipes.lock()[0]
        .try_send(&Bytes::from_static(b"and back"))
        .unwrap();
    assert!(client.wait_for(|pipes| pipes[0].is_readable()));
    assert_eq!(&client.pipes.lock()[0].try_recv().unwrap()[..], b"and back");

    connected.shutdown();
    assert!(server.wait_for(|pipes| pipes[0].is_closed()));
    bound.shutdown();
}

#[test]
fn test_tcp_round_trip() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
    exchange(&SpEngine::new(), &endpoint);
}

#[test]
fn test_tcp_bind_in_use() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
    let engine = SpEngine::new();
    let signal = Arc::new(Signal::new());
    let first = Host::new(SocketType::Pair, &signal);
    let second = Host::new(SocketType::Pair, &signal);

    let bound = engine.open(EndpointKind::Bind, &endpoint, first.weak()).unwrap();
    assert_eq!(
        engine
            .open(EndpointKind::Bind, &endpoint, second.weak())
            .err(),
        Some(Errno::AddrInUse)
    );
    bound.shutdown();
}

#[test]
fn test_tcp_incompatible_peer_is_dropped() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
    let engine = SpEngine::new();
    let signal = Arc::new(Signal::new());
    let server = Host::new(SocketType::Pub, &signal);
    let client = Host::new(SocketType::Push, &signal);

    let bound = engine.open(EndpointKind::Bind, &endpoint, server.weak()).unwrap();
    let connected = engine.open(EndpointKind::Connect, &endpoint, client.weak()).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(server.pipes.lock().is_empty());
    assert!(client.pipes.lock().is_empty());
    connected.shutdown();
    bound.shutdown();
}

#[cfg(unix)]
#[test]
fn test_ipc_round_trip() {
    let path = std::env::temp_dir().join(format!("nanolink-sp-{}.ipc", std::process::id()));
    let endpoint = Endpoint::parse(&format!("ipc://{}", path.display())).unwrap();
    exchange(&SpEngine::new(), &endpoint);
    assert!(!path.exists());
}

#[test]
fn test_inproc_names_are_per_engine() {
    let endpoint = Endpoint::parse("inproc://shared-name").unwrap();
    let signal = Arc::new(Signal::new());
    let a = Host::new(SocketType::Pair, &signal);
    let b = Host::new(SocketType::Pair, &signal);

    let first = SpEngine::new();
    let second = SpEngine::new();
    let _x = first.open(EndpointKind::Bind, &endpoint, a.weak()).unwrap();
    let _y = second.open(EndpointKind::Bind, &endpoint, b.weak()).unwrap();
    assert_eq!(
        first
            .open(EndpointKind::Bind, &endpoint, b.weak())
            .err(),
        Some(Errno::AddrInUse)
    );
}

#[test]
fn test_tcp_shutdown_is_prompt_and_releases_port() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let silent = portpicker::pick_unused_port().expect("no free port");
    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
    let nowhere = Endpoint::parse(&format!("tcp://127.0.0.1:{silent}")).unwrap();
    let engine = SpEngine::new();
    let signal = Arc::new(Signal::new());
    let server = Host::new(SocketType::Pull, &signal);
    let client = Host::new(SocketType::Push, &signal);

    let bound = engine.open(EndpointKind::Bind, &endpoint, server.weak()).unwrap();
    let retrying = engine.open(EndpointKind::Connect, &nowhere, client.weak()).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    retrying.shutdown();
    bound.shutdown();
    assert!(started.elapsed() < Duration::from_millis(500));

    let again = engine.open(EndpointKind::Bind, &endpoint, server.weak()).unwrap();
    again.shutdown();
}

#[test]
fn test_tcp_reader_waits_for_buffer_space() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
    let engine = SpEngine::new();
    let signal = Arc::new(Signal::new());
    let server = Host::new(SocketType::Pull, &signal);
    let client = Host::new(SocketType::Push, &signal);

    let bound = engine.open(EndpointKind::Bind, &endpoint, server.weak()).unwrap();
    let connected = engine.open(EndpointKind::Connect, &endpoint, client.weak()).unwrap();
    assert!(server.wait_for(|pipes| pipes.len() == 1));
    assert!(client.wait_for(|pipes| pipes.len() == 1));

    // Far more than one inbound buffer, so the server side has to wait for
    // space while nobody reads.
    let total = 64u8;
    for i in 0..total {
        let msg = Bytes::from(vec![i; 8 * 1024]);
        assert!(client.wait_for(|pipes| pipes[0].is_writable()));
        client.pipes.lock()[0].try_send(&msg).unwrap();
    }

    for i in 0..total {
        assert!(server.wait_for(|pipes| pipes[0].is_readable()));
        let msg = server.pipes.lock()[0].try_recv().unwrap();
        assert_eq!(msg.len(), 8 * 1024);
        assert!(msg.iter().all(|&b| b == i));
    }

    connected.shutdown();
    bound.shutdown();
}
