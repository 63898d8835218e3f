//! Addresses and the TCP/IPC carriers through the socket surface.

use nanolink::{
    Context, Errno, NanolinkError, AF_SP, PAIR, PULL, PUSH, RCVTIMEO, RECONNECT_IVL, REP, REQ,
    SNDTIMEO, SOL_SOCKET,
};

fn with_timeouts(ctx: &Context, h: i32) -> i32 {
    ctx.set_option(h, SOL_SOCKET, SNDTIMEO, 5000).unwrap();
    ctx.set_option(h, SOL_SOCKET, RCVTIMEO, 5000).unwrap();
    ctx.set_option(h, SOL_SOCKET, RECONNECT_IVL, 20).unwrap();
    h
}

#[test]
fn test_malformed_addresses() {
    let ctx = Context::new();
    let s = ctx.socket(AF_SP, PAIR).unwrap();

    for (address, errno) in [
        ("udp://127.0.0.1:5555", Errno::ProtoNoSupport),
        ("tcp://127.0.0.1", Errno::Inval),
        ("tcp://127.0.0.1:notaport", Errno::Inval),
        ("inproc://", Errno::Inval),
    ] {
        match ctx.bind(s, address) {
            Err(NanolinkError::Address { errno: got, .. }) => assert_eq!(got, errno, "{address}"),
            other => panic!("{address}: expected address error, got {other:?}"),
        }
    }

    let long = format!("inproc://{}", "n".repeat(200));
    assert!(matches!(
        ctx.connect(s, &long),
        Err(NanolinkError::Address { errno: Errno::NameTooLong, .. })
    ));
}

#[test]
fn test_inproc_name_in_use() {
    let ctx = Context::new();
    let a = ctx.socket(AF_SP, PAIR).unwrap();
    let b = ctx.socket(AF_SP, PAIR).unwrap();
    ctx.bind(a, "inproc://taken").unwrap();
    assert!(matches!(
        ctx.bind(b, "inproc://taken"),
        Err(NanolinkError::Bind { errno: Errno::AddrInUse, .. })
    ));
}

#[test]
fn test_tcp_reqrep() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let address = format!("tcp://127.0.0.1:{port}");

    let ctx = Context::new();
    let rep = with_timeouts(&ctx, ctx.socket(AF_SP, REP).unwrap());
    let req = with_timeouts(&ctx, ctx.socket(AF_SP, REQ).unwrap());
    ctx.bind(rep, &address).unwrap();
    ctx.connect(req, &address).unwrap();

    let payload: Vec<u8> = (0..20_000).map(|i| (i % 199) as u8).collect();
    ctx.send(req, &payload, payload.len(), 0).unwrap();
    assert_eq!(ctx.recv(rep, payload.len(), 0).unwrap(), payload);
    ctx.send(rep, b"done", 4, 0).unwrap();
    assert_eq!(ctx.recv(req, 16, 0).unwrap(), b"done");

    let other = ctx.socket(AF_SP, REP).unwrap();
    assert!(matches!(
        ctx.bind(other, &address),
        Err(NanolinkError::Bind { errno: Errno::AddrInUse, .. })
    ));
}

#[test]
fn test_tcp_connect_before_bind() {
    let port = portpicker::pick_unused_port().expect("no free port");
    let address = format!("tcp://127.0.0.1:{port}");

    let ctx = Context::new();
    let push = with_timeouts(&ctx, ctx.socket(AF_SP, PUSH).unwrap());
    let pull = with_timeouts(&ctx, ctx.socket(AF_SP, PULL).unwrap());
    ctx.connect(push, &address).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    ctx.bind(pull, &address).unwrap();

    ctx.send(push, b"late", 4, 0).unwrap();
    assert_eq!(ctx.recv(pull, 16, 0).unwrap(), b"late");
}

#[cfg(unix)]
#[test]
fn test_ipc_pair() {
    let path = std::env::temp_dir().join(format!("nanolink-facade-{}.sock", std::process::id()));
    let address = format!("ipc://{}", path.display());

    let ctx = Context::new();
    let a = with_timeouts(&ctx, ctx.socket(AF_SP, PAIR).unwrap());
    let b = with_timeouts(&ctx, ctx.socket(AF_SP, PAIR).unwrap());
    let id = ctx.bind(a, &address).unwrap();
    ctx.connect(b, &address).unwrap();

    ctx.send(b, b"over ipc", 8, 0).unwrap();
    assert_eq!(ctx.recv(a, 16, 0).unwrap(), b"over ipc");
    ctx.send(a, b"", 0, 0).unwrap();
    assert_eq!(ctx.recv(b, 16, 0).unwrap(), b"");

    ctx.shutdown(a, id).unwrap();
    assert!(!path.exists());
}
