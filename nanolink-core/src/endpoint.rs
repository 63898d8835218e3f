//! Endpoint abstraction for carrier-agnostic socket addressing.
//!
//! Parses `tcp://`, `ipc://` and `inproc://` address strings. Host names in
//! TCP addresses are kept unresolved; the carrier resolves them when it binds
//! or connects so that `IPV4ONLY` can be honoured.

use crate::error::Errno;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;

/// Longest accepted address string, scheme included.
pub const SOCKADDR_MAX: usize = 128;

/// Carrier endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP carrier: `tcp://host:port`, `tcp://*:port`, `tcp://iface;host:port`
    Tcp(TcpAddr),
    /// IPC carrier (Unix domain socket): `ipc:///path/to/socket`
    Ipc(PathBuf),
    /// In-process carrier: `inproc://name`
    Inproc(String),
}

/// Unresolved TCP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpAddr {
    /// Local interface given before `;` on connect addresses
    pub local: Option<String>,
    /// Host name, literal address, or `*` for all interfaces
    pub host: String,
    pub port: u16,
}

impl TcpAddr {
    /// True for `tcp://*:port`.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.host == "*"
    }

    /// Resolve to a socket address.
    ///
    /// The wildcard host resolves to the unspecified address of the preferred
    /// family. With `ipv4_only` set, IPv6 results are skipped.
    pub fn resolve(&self, ipv4_only: bool) -> io::Result<SocketAddr> {
        if self.is_wildcard() {
            let ip = if ipv4_only {
                IpAddr::V4(Ipv4Addr::UNSPECIFIED)
            } else {
                IpAddr::V6(Ipv6Addr::UNSPECIFIED)
            };
            return Ok(SocketAddr::new(ip, self.port));
        }
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        (host, self.port)
            .to_socket_addrs()?
            .find(|addr| !ipv4_only || addr.is_ipv4())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no usable address for {}", self.host),
                )
            })
    }
}

impl fmt::Display for TcpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(local) = &self.local {
            write!(f, "{local};")?;
        }
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use nanolink_core::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert!(endpoint.is_tcp());
    ///
    /// let endpoint = Endpoint::parse("inproc://my-endpoint").unwrap();
    /// assert!(matches!(endpoint, Endpoint::Inproc(_)));
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Returns true if this is a TCP endpoint.
    #[must_use]
    pub fn is_tcp(&self) -> bool {
        matches!(self, Endpoint::Tcp(_))
    }

    /// Returns true if this is an IPC endpoint.
    #[must_use]
    pub fn is_ipc(&self) -> bool {
        matches!(self, Endpoint::Ipc(_))
    }

    /// Returns true if this is an inproc endpoint.
    #[must_use]
    pub fn is_inproc(&self) -> bool {
        matches!(self, Endpoint::Inproc(_))
    }

    /// Option level of the carrier (`INPROC`, `IPC` or `TCP`).
    #[must_use]
    pub const fn transport_level(&self) -> i32 {
        match self {
            Endpoint::Inproc(_) => crate::options::INPROC,
            Endpoint::Ipc(_) => crate::options::IPC,
            Endpoint::Tcp(_) => crate::options::TCP,
        }
    }
}

fn parse_tcp(addr: &str) -> Result<TcpAddr, EndpointError> {
    let invalid = || EndpointError::InvalidTcpAddress(addr.to_string());

    let (local, rest) = match addr.split_once(';') {
        Some((local, rest)) if !local.is_empty() => (Some(local.to_string()), rest),
        Some(_) => return Err(invalid()),
        None => (None, addr),
    };
    let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    if host.starts_with('[') != host.ends_with(']') {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok(TcpAddr {
        local,
        host: host.to_string(),
        port,
    })
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() >= SOCKADDR_MAX {
            return Err(EndpointError::TooLong(s.len()));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            Ok(Endpoint::Tcp(parse_tcp(addr)?))
        } else if let Some(path) = s.strip_prefix("ipc://") {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(EndpointError::InvalidIpcPath(path.to_string()));
                }
                Ok(Endpoint::Ipc(PathBuf::from(path)))
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                Err(EndpointError::IpcNotSupported)
            }
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(EndpointError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Endpoint::Inproc(name.to_string()))
            }
        } else {
            Err(EndpointError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Inproc(name) => write!(f, "inproc://{name}"),
        }
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid scheme in endpoint: {0} (expected tcp://, ipc://, or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid IPC path: {0:?}")]
    InvalidIpcPath(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),

    #[error("Address of {0} bytes exceeds the limit")]
    TooLong(usize),

    #[error("IPC transport not supported on this platform")]
    IpcNotSupported,
}

impl EndpointError {
    /// Error number reported for this parse failure.
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::InvalidScheme(_) | Self::IpcNotSupported => Errno::ProtoNoSupport,
            Self::TooLong(_) => Errno::NameTooLong,
            Self::InvalidTcpAddress(_) | Self::InvalidIpcPath(_) | Self::InvalidInprocName(_) => {
                Errno::Inval
            }
        }
    }
}
