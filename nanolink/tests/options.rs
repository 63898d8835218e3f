//! Option validation through the socket surface.

use nanolink::{
    Context, Errno, NanolinkError, OptionValue, AF_SP, AF_SP_RAW, BUS, DOMAIN, IPV4ONLY, LINGER,
    MAXTTL, PAIR, PROTOCOL, RCVBUF, RCVFD, RCVMAXSIZE, RCVTIMEO, RECONNECT_IVL, REQ,
    REQ_RESEND_IVL, SNDBUF, SNDFD, SNDPRIO, SOCKET_NAME, SOL_SOCKET, SUB, SURVEYOR,
    SURVEYOR_DEADLINE, TCP, TCP_NODELAY,
};

fn option_errno<T: std::fmt::Debug>(result: Result<T, NanolinkError>) -> Errno {
    match result {
        Err(NanolinkError::Option { errno, .. }) => errno,
        other => panic!("expected option error, got {other:?}"),
    }
}

#[test]
fn test_defaults() {
    let ctx = Context::new();
    let s = ctx.socket(AF_SP, PAIR).unwrap();
    assert_eq!(ctx.get_option(s, SOL_SOCKET, LINGER).unwrap(), 1000);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, SNDBUF).unwrap(), 128 * 1024);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, RCVBUF).unwrap(), 128 * 1024);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, RCVTIMEO).unwrap(), -1);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, RECONNECT_IVL).unwrap(), 100);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, SNDPRIO).unwrap(), 8);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, IPV4ONLY).unwrap(), 1);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, RCVMAXSIZE).unwrap(), 1024 * 1024);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, MAXTTL).unwrap(), 8);
    assert_eq!(ctx.get_option(s, TCP, TCP_NODELAY).unwrap(), 0);
}

#[test]
fn test_domain_and_protocol_are_reported() {
    let ctx = Context::new();
    let s = ctx.socket(AF_SP_RAW, BUS).unwrap();
    assert_eq!(ctx.get_option(s, SOL_SOCKET, DOMAIN).unwrap(), AF_SP_RAW);
    assert_eq!(ctx.get_option(s, SOL_SOCKET, PROTOCOL).unwrap(), BUS);
}

#[test]
fn test_socket_name() {
    let ctx = Context::new();
    let s = ctx.socket(AF_SP, PAIR).unwrap();

    // String options only come back through the value entry point.
    assert_eq!(option_errno(ctx.get_option(s, SOL_SOCKET, SOCKET_NAME)), Errno::Inval);
    assert_eq!(
        ctx.get_option_value(s, SOL_SOCKET, SOCKET_NAME).unwrap(),
        OptionValue::Bytes(s.to_string().into())
    );

    ctx.set_option(s, SOL_SOCKET, SOCKET_NAME, "worker-1").unwrap();
    assert_eq!(
        ctx.get_option_value(s, SOL_SOCKET, SOCKET_NAME).unwrap(),
        OptionValue::Bytes("worker-1".into())
    );
    assert_eq!(
        option_errno(ctx.set_option(s, SOL_SOCKET, SOCKET_NAME, "x".repeat(64).as_str())),
        Errno::Inval
    );
}

#[test]
fn test_out_of_range_values() {
    let ctx = Context::new();
    let s = ctx.socket(AF_SP, PAIR).unwrap();
    for (option, value) in [
        (SNDBUF, 0),
        (RCVBUF, -5),
        (RECONNECT_IVL, -1),
        (SNDPRIO, 0),
        (SNDPRIO, 17),
        (IPV4ONLY, 2),
        (RCVMAXSIZE, -2),
        (MAXTTL, 0),
        (MAXTTL, 256),
    ] {
        assert_eq!(
            option_errno(ctx.set_option(s, SOL_SOCKET, option, value)),
            Errno::Inval,
            "option {option} = {value}"
        );
    }
    assert_eq!(option_errno(ctx.set_option(s, TCP, TCP_NODELAY, 3)), Errno::Inval);

    ctx.set_option(s, SOL_SOCKET, MAXTTL, 255).unwrap();
    ctx.set_option(s, SOL_SOCKET, RCVMAXSIZE, -1).unwrap();
    assert_eq!(ctx.get_option(s, SOL_SOCKET, RCVMAXSIZE).unwrap(), -1);
}

#[test]
fn test_unknown_and_unsupported_options() {
    let ctx = Context::new();
    let s = ctx.socket(AF_SP, PAIR).unwrap();
    assert_eq!(option_errno(ctx.get_option(s, SOL_SOCKET, 999)), Errno::NoProtoOpt);
    assert_eq!(option_errno(ctx.set_option(s, 12345, 1, 1)), Errno::NoProtoOpt);
    assert_eq!(option_errno(ctx.get_option(s, SOL_SOCKET, SNDFD)), Errno::NoProtoOpt);
    assert_eq!(option_errno(ctx.get_option(s, SOL_SOCKET, RCVFD)), Errno::NoProtoOpt);

    // Protocol level of another pattern is just an unknown level.
    assert_eq!(
        option_errno(ctx.set_option(s, SUB, nanolink::SUB_SUBSCRIBE, "")),
        Errno::NoProtoOpt
    );
}

#[test]
fn test_protocol_options() {
    let ctx = Context::new();
    let req = ctx.socket(AF_SP, REQ).unwrap();
    assert_eq!(ctx.get_option(req, REQ, REQ_RESEND_IVL).unwrap(), 60_000);
    assert_eq!(option_errno(ctx.set_option(req, REQ, REQ_RESEND_IVL, 0)), Errno::Inval);

    let surveyor = ctx.socket(AF_SP, SURVEYOR).unwrap();
    assert_eq!(ctx.get_option(surveyor, SURVEYOR, SURVEYOR_DEADLINE).unwrap(), 1000);
    ctx.set_option(surveyor, SURVEYOR, SURVEYOR_DEADLINE, 250).unwrap();
    assert_eq!(ctx.get_option(surveyor, SURVEYOR, SURVEYOR_DEADLINE).unwrap(), 250);

    let sub = ctx.socket(AF_SP, SUB).unwrap();
    assert_eq!(
        option_errno(ctx.set_option(sub, SUB, nanolink::SUB_SUBSCRIBE, 5)),
        Errno::Inval
    );
}
