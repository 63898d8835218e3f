//! TCP socket tuning shared by the carrier layer.
//!
//! Carriers own their streams through the async runtime, so options are
//! applied through a borrowed OS handle rather than a std type.

#![allow(unsafe_code)]

use socket2::SockRef;
use std::io;

/// Enable or disable TCP_NODELAY on any connected TCP stream.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
#[cfg(unix)]
#[inline]
pub fn set_tcp_nodelay<S: std::os::unix::io::AsRawFd>(stream: &S, nodelay: bool) -> io::Result<()> {
    use std::os::unix::io::BorrowedFd;
    // SAFETY: the descriptor is owned by `stream`, which outlives the borrow.
    let fd = unsafe { BorrowedFd::borrow_raw(stream.as_raw_fd()) };
    SockRef::from(&fd).set_nodelay(nodelay)
}

/// Enable or disable TCP_NODELAY on any connected TCP stream.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
#[cfg(windows)]
#[inline]
pub fn set_tcp_nodelay<S: std::os::windows::io::AsRawSocket>(
    stream: &S,
    nodelay: bool,
) -> io::Result<()> {
    use std::os::windows::io::BorrowedSocket;
    // SAFETY: the socket is owned by `stream`, which outlives the borrow.
    let socket = unsafe { BorrowedSocket::borrow_raw(stream.as_raw_socket()) };
    SockRef::from(&socket).set_nodelay(nodelay)
}
