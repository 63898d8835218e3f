//! The process-wide default context.
//!
//! Lives in its own test binary: `term()` is irreversible for the process.

use nanolink::{NanolinkError, AF_SP, PAIR, PULL};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_term_unblocks_everything() {
    let a = nanolink::socket(AF_SP, PAIR).unwrap();
    let b = nanolink::socket(AF_SP, PAIR).unwrap();
    let id = nanolink::bind(a, "inproc://global").unwrap();
    nanolink::connect(b, "inproc://global").unwrap();
    nanolink::send(a, b"hi", 2, 0).unwrap();
    assert_eq!(&nanolink::recv_msg(b, 0).unwrap()[..], b"hi");

    let pull = nanolink::socket(AF_SP, PULL).unwrap();
    let receiver = thread::spawn(move || nanolink::recv(pull, 16, 0));
    let poller = thread::spawn(move || nanolink::poll(&[a], &[], &[], -1));
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    nanolink::term();
    assert!(matches!(receiver.join().unwrap(), Err(NanolinkError::Terminated)));
    assert!(matches!(poller.join().unwrap(), Err(NanolinkError::Terminated)));
    assert!(started.elapsed() < Duration::from_secs(1));

    nanolink::term();
    assert!(nanolink::default_context().is_terminated());
    assert!(matches!(
        nanolink::socket(AF_SP, PAIR),
        Err(NanolinkError::SocketCreation(nanolink::Errno::Term))
    ));
    assert!(matches!(nanolink::shutdown(a, id), Err(NanolinkError::Terminated)));
    assert!(matches!(nanolink::send(b, b"x", 1, 0), Err(NanolinkError::Terminated)));

    nanolink::close(a).unwrap();
    nanolink::close(b).unwrap();
    assert!(matches!(nanolink::close(a), Err(NanolinkError::InvalidHandle(h)) if h == a));
}
