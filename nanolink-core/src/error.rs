//! Nanolink error types.
//!
//! Every failing operation is reported as a `NanolinkError`. Each variant maps
//! onto the historical `-1` sentinel and carries an [`Errno`] whose text is the
//! human-readable description a caller would get from `strerror`.

use std::fmt;
use std::io;
use thiserror::Error;

/// Base for library-specific error numbers that have no POSIX counterpart.
pub const HAUSNUMERO: i32 = 156_384_712;

/// Error numbers reported by sockets, protocols and carriers.
///
/// Values follow Linux where a POSIX code exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Bad socket handle
    BadF,
    /// Invalid argument
    Inval,
    /// Address already in use
    AddrInUse,
    /// Cannot assign requested address
    AddrNotAvail,
    /// Resource temporarily unavailable
    Again,
    /// Operation timed out
    TimedOut,
    /// Operation not supported by the pattern
    NotSup,
    /// Address family (domain) not supported
    AfNoSupport,
    /// Protocol or transport not supported
    ProtoNoSupport,
    /// Too many open sockets
    MFile,
    /// Unknown option
    NoProtoOpt,
    /// Connection refused
    ConnRefused,
    /// Message too long
    MsgSize,
    /// Address too long
    NameTooLong,
    /// No such device
    NoDev,
    /// Library is terminating
    Term,
    /// Operation cannot be performed in this state
    Fsm,
}

impl Errno {
    /// Numeric error code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::BadF => 9,
            Self::Inval => 22,
            Self::AddrInUse => 98,
            Self::AddrNotAvail => 99,
            Self::Again => 11,
            Self::TimedOut => 110,
            Self::NotSup => 95,
            Self::AfNoSupport => 97,
            Self::ProtoNoSupport => 93,
            Self::MFile => 24,
            Self::NoProtoOpt => 92,
            Self::ConnRefused => 111,
            Self::MsgSize => 90,
            Self::NameTooLong => 36,
            Self::NoDev => 19,
            Self::Term => HAUSNUMERO + 53,
            Self::Fsm => HAUSNUMERO + 54,
        }
    }

    /// Reverse lookup of [`Errno::code`].
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        const ALL: [Errno; 17] = [
            Errno::BadF,
            Errno::Inval,
            Errno::AddrInUse,
            Errno::AddrNotAvail,
            Errno::Again,
            Errno::TimedOut,
            Errno::NotSup,
            Errno::AfNoSupport,
            Errno::ProtoNoSupport,
            Errno::MFile,
            Errno::NoProtoOpt,
            Errno::ConnRefused,
            Errno::MsgSize,
            Errno::NameTooLong,
            Errno::NoDev,
            Errno::Term,
            Errno::Fsm,
        ];
        ALL.into_iter().find(|e| e.code() == code)
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::BadF => "Bad file descriptor",
            Self::Inval => "Invalid argument",
            Self::AddrInUse => "Address already in use",
            Self::AddrNotAvail => "Cannot assign requested address",
            Self::Again => "Resource temporarily unavailable",
            Self::TimedOut => "Connection timed out",
            Self::NotSup => "Operation not supported",
            Self::AfNoSupport => "Address family not supported by protocol",
            Self::ProtoNoSupport => "Protocol not supported",
            Self::MFile => "Too many open files",
            Self::NoProtoOpt => "Protocol not available",
            Self::ConnRefused => "Connection refused",
            Self::MsgSize => "Message too long",
            Self::NameTooLong => "File name too long",
            Self::NoDev => "No such device",
            Self::Term => "Nanomsg library was terminated",
            Self::Fsm => "Operation cannot be performed in this state",
        }
    }

    /// Map an I/O error from a carrier onto the closest error number.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::AddrInUse => Self::AddrInUse,
            io::ErrorKind::AddrNotAvailable => Self::AddrNotAvail,
            io::ErrorKind::ConnectionRefused => Self::ConnRefused,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::WouldBlock => Self::Again,
            io::ErrorKind::NotFound => Self::NoDev,
            _ => Self::Inval,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Description for a numeric error code, `"Unknown error"` when unmapped.
#[must_use]
pub fn strerror(code: i32) -> &'static str {
    Errno::from_code(code).map_or("Unknown error", Errno::description)
}

/// Main error type for nanolink operations.
#[derive(Error, Debug)]
pub enum NanolinkError {
    /// Socket could not be created
    #[error("socket creation failed: {0}")]
    SocketCreation(Errno),

    /// Address string is malformed or names an unsupported carrier
    #[error("invalid address '{address}': {errno}")]
    Address { address: String, errno: Errno },

    /// Local endpoint could not be bound
    #[error("bind to '{address}' failed: {errno}")]
    Bind { address: String, errno: Errno },

    /// Outbound endpoint could not be created
    #[error("connect to '{address}' failed: {errno}")]
    Connect { address: String, errno: Errno },

    /// Handle does not reference an open socket
    #[error("invalid socket handle {0}")]
    InvalidHandle(i32),

    /// Endpoint id does not reference a live endpoint of the socket
    #[error("invalid endpoint {endpoint} on socket {socket}")]
    InvalidConnection { socket: i32, endpoint: i32 },

    /// Option read or write rejected
    #[error("option ({level}, {option}) failed: {errno}")]
    Option { level: i32, option: i32, errno: Errno },

    /// Readiness wait rejected, e.g. an empty request that would wait forever
    #[error("poll failed: {0}")]
    Poll(Errno),

    /// Send rejected by the socket or its pattern
    #[error("send failed: {0}")]
    Send(Errno),

    /// Receive rejected by the socket or its pattern
    #[error("recv failed: {0}")]
    Recv(Errno),

    /// Non-blocking operation could not complete immediately
    #[error("operation would block")]
    WouldBlock,

    /// Device loop stopped
    #[error("device failed: {0}")]
    Bridge(Errno),

    /// Library has been terminated
    #[error("library is terminating")]
    Terminated,
}

/// Result type alias for nanolink operations
pub type Result<T> = std::result::Result<T, NanolinkError>;

impl NanolinkError {
    /// Create an address error
    pub fn address(address: impl Into<String>, errno: Errno) -> Self {
        Self::Address {
            address: address.into(),
            errno,
        }
    }

    /// Create a bind error
    pub fn bind(address: impl Into<String>, errno: Errno) -> Self {
        Self::Bind {
            address: address.into(),
            errno,
        }
    }

    /// Create a connect error
    pub fn connect(address: impl Into<String>, errno: Errno) -> Self {
        Self::Connect {
            address: address.into(),
            errno,
        }
    }

    /// Create an option error
    #[must_use]
    pub const fn option(level: i32, option: i32, errno: Errno) -> Self {
        Self::Option {
            level,
            option,
            errno,
        }
    }

    /// Error number carried by this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::SocketCreation(e)
            | Self::Poll(e)
            | Self::Send(e)
            | Self::Recv(e)
            | Self::Bridge(e) => e.code(),
            Self::Address { errno, .. }
            | Self::Bind { errno, .. }
            | Self::Connect { errno, .. }
            | Self::Option { errno, .. } => errno.code(),
            Self::InvalidHandle(_) => Errno::BadF.code(),
            Self::InvalidConnection { .. } => Errno::Inval.code(),
            Self::WouldBlock => Errno::Again.code(),
            Self::Terminated => Errno::Term.code(),
        }
    }

    /// Status value historically returned next to the error.
    #[inline]
    #[must_use]
    pub const fn sentinel(&self) -> i32 {
        -1
    }

    /// Check if this is the non-blocking "try again" outcome
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Check if this error was caused by library termination
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_roundtrip() {
        for code in [9, 22, 98, 11, 110, 95, 97, 93, 24, 92, HAUSNUMERO + 53, HAUSNUMERO + 54] {
            assert_eq!(Errno::from_code(code).map(Errno::code), Some(code));
        }
        assert_eq!(Errno::from_code(-5), None);
    }

    #[test]
    fn test_strerror() {
        assert_eq!(strerror(22), "Invalid argument");
        assert_eq!(strerror(Errno::Term.code()), "Nanomsg library was terminated");
        assert_eq!(strerror(123_456), "Unknown error");
    }

    #[test]
    fn test_error_display_carries_errno_text() {
        let err = NanolinkError::bind("inproc://a", Errno::AddrInUse);
        assert_eq!(err.to_string(), "bind to 'inproc://a' failed: Address already in use");
        assert_eq!(err.errno(), 98);
        assert_eq!(err.sentinel(), -1);
    }

    #[test]
    fn test_classification() {
        assert!(NanolinkError::WouldBlock.is_would_block());
        assert!(NanolinkError::Terminated.is_terminated());
        assert!(!NanolinkError::Send(Errno::Again).is_would_block());
        assert_eq!(NanolinkError::InvalidHandle(3).errno(), Errno::BadF.code());
    }

    #[test]
    fn test_io_mapping() {
        let err = io::Error::new(io::ErrorKind::AddrInUse, "taken");
        assert_eq!(Errno::from_io(&err), Errno::AddrInUse);
        let err = io::Error::new(io::ErrorKind::Other, "?");
        assert_eq!(Errno::from_io(&err), Errno::Inval);
    }
}
