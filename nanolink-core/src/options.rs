//! Socket configuration options
//!
//! Options are addressed by a numeric `(level, option)` pair, as with
//! `nn_setsockopt`/`nn_getsockopt`. Socket-level and transport-level options
//! live in [`SocketOptions`]; protocol-level options are handled by the
//! protocol itself.

use crate::error::Errno;
use bytes::Bytes;
use std::time::Duration;

/// Socket-level option namespace.
pub const SOL_SOCKET: i32 = 0;

/// Transport-level option namespaces.
pub const INPROC: i32 = -1;
pub const IPC: i32 = -2;
pub const TCP: i32 = -3;

pub const LINGER: i32 = 1;
pub const SNDBUF: i32 = 2;
pub const RCVBUF: i32 = 3;
pub const SNDTIMEO: i32 = 4;
pub const RCVTIMEO: i32 = 5;
pub const RECONNECT_IVL: i32 = 6;
pub const RECONNECT_IVL_MAX: i32 = 7;
pub const SNDPRIO: i32 = 8;
pub const RCVPRIO: i32 = 9;
pub const SNDFD: i32 = 10;
pub const RCVFD: i32 = 11;
pub const DOMAIN: i32 = 12;
pub const PROTOCOL: i32 = 13;
pub const IPV4ONLY: i32 = 14;
pub const SOCKET_NAME: i32 = 15;
pub const RCVMAXSIZE: i32 = 16;
pub const MAXTTL: i32 = 17;

/// `TCP` level: disable Nagle's algorithm.
pub const TCP_NODELAY: i32 = 1;

/// Longest accepted `SOCKET_NAME`.
pub const SOCKET_NAME_MAX: usize = 63;

/// Option value: an integer or a raw byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(i32),
    Bytes(Bytes),
}

impl OptionValue {
    /// Integer payload, `EINVAL` for byte strings.
    pub fn as_int(&self) -> Result<i32, Errno> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Bytes(_) => Err(Errno::Inval),
        }
    }

    /// Byte payload, `EINVAL` for integers.
    pub fn as_bytes(&self) -> Result<&Bytes, Errno> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::Int(_) => Err(Errno::Inval),
        }
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Bytes(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<&[u8]> for OptionValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Bytes> for OptionValue {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use nanolink_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_recv_timeout(Duration::from_secs(5))
///     .with_sndbuf(64 * 1024);
/// assert_eq!(opts.sndbuf, 65536);
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Linger (LINGER), stored and reported only
    pub linger: i32,

    /// Outbound buffer per pipe in bytes (SNDBUF)
    pub sndbuf: usize,

    /// Inbound buffer per pipe in bytes (RCVBUF)
    pub rcvbuf: usize,

    /// Send timeout (SNDTIMEO)
    /// - `None`: Block indefinitely (default)
    pub send_timeout: Option<Duration>,

    /// Receive timeout (RCVTIMEO)
    /// - `None`: Block indefinitely (default)
    pub recv_timeout: Option<Duration>,

    /// Initial reconnection delay (RECONNECT_IVL)
    pub reconnect_ivl: Duration,

    /// Maximum reconnection delay (RECONNECT_IVL_MAX)
    /// - `Duration::ZERO`: no backoff, always use `reconnect_ivl`
    pub reconnect_ivl_max: Duration,

    /// Outbound pipe priority, 1 (highest) to 16 (SNDPRIO)
    pub send_priority: u8,

    /// Inbound pipe priority, 1 (highest) to 16 (RCVPRIO)
    pub recv_priority: u8,

    /// Restrict name resolution to IPv4 (IPV4ONLY)
    pub ipv4_only: bool,

    /// Name used in log records (SOCKET_NAME)
    pub socket_name: Bytes,

    /// Largest accepted inbound message (RCVMAXSIZE)
    /// - `None`: No limit
    pub recv_max_size: Option<usize>,

    /// Maximum number of hops in a request backtrace (MAXTTL)
    pub max_ttl: u8,

    /// Disable Nagle's algorithm on TCP connections (TCP_NODELAY)
    pub tcp_nodelay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            linger: 1000,
            sndbuf: 128 * 1024,
            rcvbuf: 128 * 1024,
            send_timeout: None,
            recv_timeout: None,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::ZERO,
            send_priority: 8,
            recv_priority: 8,
            ipv4_only: true,
            socket_name: Bytes::new(),
            recv_max_size: Some(1024 * 1024),
            max_ttl: 8,
            tcp_nodelay: false,
        }
    }
}

fn millis(d: Duration) -> i32 {
    i32::try_from(d.as_millis()).unwrap_or(i32::MAX)
}

fn timeout_millis(d: Option<Duration>) -> i32 {
    d.map_or(-1, millis)
}

fn flag(value: i32) -> Result<bool, Errno> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Errno::Inval),
    }
}

fn priority(value: i32) -> Result<u8, Errno> {
    if (1..=16).contains(&value) {
        Ok(value as u8)
    } else {
        Err(Errno::Inval)
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set receive timeout.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set reconnection interval.
    #[must_use]
    pub fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    /// Set maximum reconnection interval.
    #[must_use]
    pub fn with_reconnect_ivl_max(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl_max = ivl;
        self
    }

    #[must_use]
    pub fn with_sndbuf(mut self, size: usize) -> Self {
        self.sndbuf = size;
        self
    }

    #[must_use]
    pub fn with_rcvbuf(mut self, size: usize) -> Self {
        self.rcvbuf = size;
        self
    }

    #[must_use]
    pub fn with_recv_max_size(mut self, size: Option<usize>) -> Self {
        self.recv_max_size = size;
        self
    }

    #[must_use]
    pub fn with_tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Apply a socket-level or transport-level option.
    ///
    /// `DOMAIN` and `PROTOCOL` are read-only and report `ENOPROTOOPT` here,
    /// as do `SNDFD`/`RCVFD` which this library does not expose.
    pub fn set(&mut self, level: i32, option: i32, value: &OptionValue) -> Result<(), Errno> {
        match (level, option) {
            (SOL_SOCKET, SOCKET_NAME) => {
                let name = value.as_bytes()?;
                if name.len() > SOCKET_NAME_MAX {
                    return Err(Errno::Inval);
                }
                self.socket_name = name.clone();
                return Ok(());
            }
            (SOL_SOCKET, _) | (TCP, TCP_NODELAY) => {}
            _ => return Err(Errno::NoProtoOpt),
        }

        let v = value.as_int()?;
        match (level, option) {
            (SOL_SOCKET, LINGER) => self.linger = v,
            (SOL_SOCKET, SNDBUF) if v > 0 => self.sndbuf = v as usize,
            (SOL_SOCKET, RCVBUF) if v > 0 => self.rcvbuf = v as usize,
            (SOL_SOCKET, SNDBUF | RCVBUF) => return Err(Errno::Inval),
            (SOL_SOCKET, SNDTIMEO) => {
                self.send_timeout = (v >= 0).then(|| Duration::from_millis(v as u64));
            }
            (SOL_SOCKET, RCVTIMEO) => {
                self.recv_timeout = (v >= 0).then(|| Duration::from_millis(v as u64));
            }
            (SOL_SOCKET, RECONNECT_IVL | RECONNECT_IVL_MAX) if v < 0 => {
                return Err(Errno::Inval)
            }
            (SOL_SOCKET, RECONNECT_IVL) => self.reconnect_ivl = Duration::from_millis(v as u64),
            (SOL_SOCKET, RECONNECT_IVL_MAX) => {
                self.reconnect_ivl_max = Duration::from_millis(v as u64);
            }
            (SOL_SOCKET, SNDPRIO) => self.send_priority = priority(v)?,
            (SOL_SOCKET, RCVPRIO) => self.recv_priority = priority(v)?,
            (SOL_SOCKET, IPV4ONLY) => self.ipv4_only = flag(v)?,
            (SOL_SOCKET, RCVMAXSIZE) => {
                self.recv_max_size = match v {
                    -1 => None,
                    v if v >= 0 => Some(v as usize),
                    _ => return Err(Errno::Inval),
                };
            }
            (SOL_SOCKET, MAXTTL) if (1..=255).contains(&v) => self.max_ttl = v as u8,
            (SOL_SOCKET, MAXTTL) => return Err(Errno::Inval),
            (TCP, TCP_NODELAY) => self.tcp_nodelay = flag(v)?,
            _ => return Err(Errno::NoProtoOpt),
        }
        Ok(())
    }

    /// Read a socket-level or transport-level option.
    pub fn get(&self, level: i32, option: i32) -> Result<OptionValue, Errno> {
        let v = match (level, option) {
            (SOL_SOCKET, SOCKET_NAME) => return Ok(OptionValue::Bytes(self.socket_name.clone())),
            (SOL_SOCKET, LINGER) => self.linger,
            (SOL_SOCKET, SNDBUF) => i32::try_from(self.sndbuf).unwrap_or(i32::MAX),
            (SOL_SOCKET, RCVBUF) => i32::try_from(self.rcvbuf).unwrap_or(i32::MAX),
            (SOL_SOCKET, SNDTIMEO) => timeout_millis(self.send_timeout),
            (SOL_SOCKET, RCVTIMEO) => timeout_millis(self.recv_timeout),
            (SOL_SOCKET, RECONNECT_IVL) => millis(self.reconnect_ivl),
            (SOL_SOCKET, RECONNECT_IVL_MAX) => millis(self.reconnect_ivl_max),
            (SOL_SOCKET, SNDPRIO) => i32::from(self.send_priority),
            (SOL_SOCKET, RCVPRIO) => i32::from(self.recv_priority),
            (SOL_SOCKET, IPV4ONLY) => i32::from(self.ipv4_only),
            (SOL_SOCKET, RCVMAXSIZE) => self
                .recv_max_size
                .map_or(-1, |n| i32::try_from(n).unwrap_or(i32::MAX)),
            (SOL_SOCKET, MAXTTL) => i32::from(self.max_ttl),
            (TCP, TCP_NODELAY) => i32::from(self.tcp_nodelay),
            _ => return Err(Errno::NoProtoOpt),
        };
        Ok(OptionValue::Int(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SocketOptions::default();
        assert_eq!(opts.get(SOL_SOCKET, SNDBUF), Ok(OptionValue::Int(131_072)));
        assert_eq!(opts.get(SOL_SOCKET, RCVTIMEO), Ok(OptionValue::Int(-1)));
        assert_eq!(opts.get(SOL_SOCKET, RECONNECT_IVL), Ok(OptionValue::Int(100)));
        assert_eq!(opts.get(SOL_SOCKET, RCVMAXSIZE), Ok(OptionValue::Int(1_048_576)));
        assert_eq!(opts.get(SOL_SOCKET, IPV4ONLY), Ok(OptionValue::Int(1)));
        assert_eq!(opts.get(SOL_SOCKET, MAXTTL), Ok(OptionValue::Int(8)));
    }

    #[test]
    fn test_set_timeouts() {
        let mut opts = SocketOptions::default();
        opts.set(SOL_SOCKET, RCVTIMEO, &OptionValue::Int(250)).unwrap();
        assert_eq!(opts.recv_timeout, Some(Duration::from_millis(250)));
        opts.set(SOL_SOCKET, RCVTIMEO, &OptionValue::Int(-1)).unwrap();
        assert_eq!(opts.recv_timeout, None);
    }

    #[test]
    fn test_range_validation() {
        let mut opts = SocketOptions::default();
        assert_eq!(opts.set(SOL_SOCKET, SNDPRIO, &0.into()), Err(Errno::Inval));
        assert_eq!(opts.set(SOL_SOCKET, SNDPRIO, &17.into()), Err(Errno::Inval));
        assert_eq!(opts.set(SOL_SOCKET, SNDBUF, &0.into()), Err(Errno::Inval));
        assert_eq!(opts.set(SOL_SOCKET, IPV4ONLY, &2.into()), Err(Errno::Inval));
        assert_eq!(opts.set(SOL_SOCKET, MAXTTL, &256.into()), Err(Errno::Inval));
        assert_eq!(opts.set(SOL_SOCKET, RCVMAXSIZE, &(-2).into()), Err(Errno::Inval));
        opts.set(SOL_SOCKET, RCVMAXSIZE, &(-1).into()).unwrap();
        assert_eq!(opts.recv_max_size, None);
    }

    #[test]
    fn test_unknown_and_read_only() {
        let mut opts = SocketOptions::default();
        assert_eq!(opts.set(SOL_SOCKET, 999, &1.into()), Err(Errno::NoProtoOpt));
        assert_eq!(opts.set(SOL_SOCKET, DOMAIN, &1.into()), Err(Errno::NoProtoOpt));
        assert_eq!(opts.get(SOL_SOCKET, SNDFD), Err(Errno::NoProtoOpt));
        assert_eq!(opts.set(IPC, 1, &1.into()), Err(Errno::NoProtoOpt));
    }

    #[test]
    fn test_value_kind_mismatch() {
        let mut opts = SocketOptions::default();
        assert_eq!(opts.set(SOL_SOCKET, SNDBUF, &"big".into()), Err(Errno::Inval));
        assert_eq!(opts.set(SOL_SOCKET, SOCKET_NAME, &5.into()), Err(Errno::Inval));
    }

    #[test]
    fn test_socket_name() {
        let mut opts = SocketOptions::default();
        opts.set(SOL_SOCKET, SOCKET_NAME, &"frontend".into()).unwrap();
        assert_eq!(
            opts.get(SOL_SOCKET, SOCKET_NAME),
            Ok(OptionValue::Bytes(Bytes::from_static(b"frontend")))
        );
        let long = "n".repeat(SOCKET_NAME_MAX + 1);
        assert_eq!(opts.set(SOL_SOCKET, SOCKET_NAME, &long.as_str().into()), Err(Errno::Inval));
    }

    #[test]
    fn test_tcp_nodelay() {
        let mut opts = SocketOptions::default();
        opts.set(TCP, TCP_NODELAY, &1.into()).unwrap();
        assert!(opts.tcp_nodelay);
        assert_eq!(opts.get(TCP, TCP_NODELAY), Ok(OptionValue::Int(1)));
    }
}
