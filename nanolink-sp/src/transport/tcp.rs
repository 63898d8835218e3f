//! TCP carrier.

use super::stream::{self, Acceptor};
use crate::codec::Framing;
use compio::net::{TcpListener, TcpStream};
use nanolink_core::endpoint::{Endpoint, TcpAddr};
use nanolink_core::error::Errno;
use nanolink_core::options::SocketOptions;
use nanolink_core::protocol::{EndpointHandle, EndpointKind, PipeHost, ProtoResult};
use nanolink_core::tcp::set_tcp_nodelay;
use std::io;
use std::sync::Weak;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Listener that applies `TCP_NODELAY` to accepted connections.
struct NodelayListener {
    listener: TcpListener,
    nodelay: bool,
}

impl Acceptor for NodelayListener {
    type Conn = TcpStream;

    async fn accept_conn(&self) -> io::Result<TcpStream> {
        let (conn, peer) = self.listener.accept().await?;
        set_tcp_nodelay(&conn, self.nodelay)?;
        debug!("[TCP] accepted {}", peer);
        Ok(conn)
    }
}

async fn connect(target: TcpAddr, options: SocketOptions) -> io::Result<TcpStream> {
    let resolved = target.resolve(options.ipv4_only)?;
    let conn = compio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(resolved))
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
    set_tcp_nodelay(&conn, options.tcp_nodelay)?;
    Ok(conn)
}

/// Open a TCP endpoint.
///
/// Binding completes before this returns so that address errors reach the
/// caller. Connecting never fails here; the dialer retries in the background.
pub(crate) fn open(
    kind: EndpointKind,
    addr: &TcpAddr,
    host: Weak<dyn PipeHost>,
) -> ProtoResult<Box<dyn EndpointHandle>> {
    let options = host.upgrade().ok_or(Errno::BadF)?.options();
    let endpoint = Endpoint::Tcp(addr.clone());
    let io_errno = |e: io::Error| Errno::from_io(&e);

    let handle = match kind {
        EndpointKind::Bind => {
            let resolved = addr.resolve(options.ipv4_only).map_err(|_| Errno::NoDev)?;
            let nodelay = options.tcp_nodelay;
            stream::listen(endpoint, Framing::Tcp, host, move || async move {
                let listener = TcpListener::bind(resolved).await?;
                debug!("[TCP] listening on {} (nodelay={})", resolved, nodelay);
                Ok(NodelayListener { listener, nodelay })
            })
            .map_err(io_errno)?
        }
        EndpointKind::Connect => {
            let target = addr.clone();
            stream::dial(endpoint, Framing::Tcp, host, move |options| {
                connect(target.clone(), options)
            })
            .map_err(io_errno)?
        }
    };
    Ok(Box::new(handle))
}
