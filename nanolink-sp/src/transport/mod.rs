//! Carriers: the transports that connect sockets.
//!
//! - `inproc`: direct pipes between sockets of one context
//! - `tcp`: SP over TCP, one `compio` runtime thread per endpoint
//! - `ipc`: SP over Unix domain sockets (Unix only), same runtime model

mod inproc;
#[cfg(unix)]
mod ipc;
mod stream;
mod tcp;

pub use inproc::InprocRegistry;

use nanolink_core::endpoint::Endpoint;
use nanolink_core::protocol::{EndpointHandle, EndpointKind, PipeHost, ProtoResult};
use std::sync::{Arc, Weak};

/// Open an endpoint on the carrier selected by its scheme.
pub(crate) fn open(
    inproc: &Arc<InprocRegistry>,
    kind: EndpointKind,
    endpoint: &Endpoint,
    host: Weak<dyn PipeHost>,
) -> ProtoResult<Box<dyn EndpointHandle>> {
    match endpoint {
        Endpoint::Inproc(name) => inproc.open(kind, name, host),
        Endpoint::Tcp(addr) => tcp::open(kind, addr, host),
        #[cfg(unix)]
        Endpoint::Ipc(path) => ipc::open(kind, path, host),
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(nanolink_core::error::Errno::ProtoNoSupport),
    }
}
