//! IPC carrier over Unix domain sockets.

use super::stream::{self, Acceptor};
use crate::codec::Framing;
use compio::net::{UnixListener, UnixStream};
use nanolink_core::endpoint::Endpoint;
use nanolink_core::error::Errno;
use nanolink_core::protocol::{EndpointHandle, EndpointKind, PipeHost, ProtoResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use tracing::debug;

impl Acceptor for UnixListener {
    type Conn = UnixStream;

    async fn accept_conn(&self) -> io::Result<UnixStream> {
        let (conn, _) = self.accept().await?;
        Ok(conn)
    }
}

/// Bind `path`, replacing a socket file left behind by a dead process.
async fn bind_path(path: PathBuf) -> io::Result<UnixListener> {
    if path.exists() {
        if UnixStream::connect(&path).await.is_ok() {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }
        debug!("[IPC] removing stale socket {}", path.display());
        let _ = std::fs::remove_file(&path);
    }
    let listener = UnixListener::bind(&path).await?;
    debug!("[IPC] listening on {}", path.display());
    Ok(listener)
}

/// Open an IPC endpoint.
pub(crate) fn open(
    kind: EndpointKind,
    path: &Path,
    host: Weak<dyn PipeHost>,
) -> ProtoResult<Box<dyn EndpointHandle>> {
    let endpoint = Endpoint::Ipc(path.to_path_buf());
    let io_errno = |e: io::Error| Errno::from_io(&e);

    let handle = match kind {
        EndpointKind::Bind => {
            let target = path.to_path_buf();
            stream::listen(endpoint, Framing::Ipc, host, move || bind_path(target))
                .map_err(io_errno)?
                .with_cleanup(path.to_path_buf())
        }
        EndpointKind::Connect => {
            let target = path.to_path_buf();
            stream::dial(endpoint, Framing::Ipc, host, move |_| {
                let target = target.clone();
                async move { UnixStream::connect(&target).await }
            })
            .map_err(io_errno)?
        }
    };
    Ok(Box::new(handle))
}
