//! In-process carrier.
//!
//! Sockets of one context find each other by name through an
//! [`InprocRegistry`]. A name has at most one binder and any number of
//! connectors. Connecting before anything is bound is allowed: the connector
//! stays registered and is paired as soon as a binder appears, and again if
//! the name is re-bound later.
//!
//! Pairing creates a pipe directly between the two sockets' protocols; no
//! thread or copy is involved.

use dashmap::DashMap;
use nanolink_core::endpoint::Endpoint;
use nanolink_core::error::Errno;
use nanolink_core::pipe::{self, PipeCloser};
use nanolink_core::protocol::{EndpointHandle, EndpointKind, PipeHost, ProtoResult};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// One side of an inproc name: a bound or connecting socket.
struct Peer {
    host: Weak<dyn PipeHost>,
    links: Mutex<Vec<PipeCloser>>,
}

impl Peer {
    fn new(host: Weak<dyn PipeHost>) -> Arc<Self> {
        Arc::new(Self {
            host,
            links: Mutex::new(Vec::new()),
        })
    }

    fn track(&self, closer: PipeCloser) {
        let mut links = self.links.lock();
        links.retain(|link| !link.is_closed());
        links.push(closer);
    }

    fn close_links(&self) {
        for link in self.links.lock().drain(..) {
            link.close();
        }
    }
}

#[derive(Default)]
struct Slot {
    binder: Option<Arc<Peer>>,
    connectors: Vec<Arc<Peer>>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.binder.is_none() && self.connectors.is_empty()
    }
}

/// Name registry shared by all sockets of a context.
#[derive(Default)]
pub struct InprocRegistry {
    slots: DashMap<String, Slot>,
}

impl std::fmt::Debug for InprocRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InprocRegistry")
            .field("names", &self.slots.len())
            .finish()
    }
}

impl InprocRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `host` under `name` and pair it with the other side.
    ///
    /// # Errors
    ///
    /// `EADDRINUSE` when binding a name that already has a live binder.
    pub fn open(
        self: &Arc<Self>,
        kind: EndpointKind,
        name: &str,
        host: Weak<dyn PipeHost>,
    ) -> ProtoResult<Box<dyn EndpointHandle>> {
        let peer = Peer::new(host);
        let counterparts: Vec<Arc<Peer>> = {
            let mut slot = self.slots.entry(name.to_string()).or_default();
            match kind {
                EndpointKind::Bind => {
                    if slot
                        .binder
                        .as_ref()
                        .is_some_and(|b| b.host.strong_count() > 0)
                    {
                        debug!("[INPROC] {} already bound", name);
                        return Err(Errno::AddrInUse);
                    }
                    slot.binder = Some(Arc::clone(&peer));
                    slot.connectors.retain(|c| c.host.strong_count() > 0);
                    slot.connectors.clone()
                }
                EndpointKind::Connect => {
                    slot.connectors.push(Arc::clone(&peer));
                    slot.binder.iter().cloned().collect()
                }
            }
        };

        // Pipes are attached outside the map lock: attaching takes the
        // sockets' protocol locks.
        for other in &counterparts {
            match kind {
                EndpointKind::Bind => link(&peer, other),
                EndpointKind::Connect => link(other, &peer),
            }
        }
        trace!("[INPROC] {:?} {} paired with {} peers", kind, name, counterparts.len());

        Ok(Box::new(InprocEndpoint {
            registry: Arc::clone(self),
            endpoint: Endpoint::Inproc(name.to_string()),
            name: name.to_string(),
            kind,
            peer,
        }))
    }

    /// Drop every registration and close every inproc pipe.
    pub fn clear(&self) {
        let names: Vec<String> = self.slots.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, slot)) = self.slots.remove(&name) {
                for peer in slot.binder.iter().chain(slot.connectors.iter()) {
                    peer.close_links();
                }
            }
        }
    }

    /// Number of names with at least one registration.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn remove(&self, name: &str, kind: EndpointKind, peer: &Arc<Peer>) {
        if let Some(mut slot) = self.slots.get_mut(name) {
            match kind {
                EndpointKind::Bind => {
                    if slot.binder.as_ref().is_some_and(|b| Arc::ptr_eq(b, peer)) {
                        slot.binder = None;
                    }
                }
                EndpointKind::Connect => slot.connectors.retain(|c| !Arc::ptr_eq(c, peer)),
            }
        }
        self.slots.remove_if(name, |_, slot| slot.is_empty());
    }
}

/// Create a pipe between a binder and a connector.
fn link(binder: &Peer, connector: &Peer) {
    let (Some(bh), Some(ch)) = (binder.host.upgrade(), connector.host.upgrade()) else {
        return;
    };
    let (bt, ct) = (bh.socket_type(), ch.socket_type());
    if !bh.accepts_peer(ct.number()) || !ch.accepts_peer(bt.number()) {
        debug!("[INPROC] ignoring incompatible peers {} and {}", bt, ct);
        return;
    }

    let (bound_end, connected_end) = pipe::pair(bh.signal(), bh.pipe_config(), ch.pipe_config());
    binder.track(bound_end.closer());
    connector.track(connected_end.closer());

    if let Err(errno) = bh.attach_pipe(bound_end) {
        debug!("[INPROC] socket {} rejected pipe: {}", bh.socket_id(), errno);
        return;
    }
    if let Err(errno) = ch.attach_pipe(connected_end) {
        debug!("[INPROC] socket {} rejected pipe: {}", ch.socket_id(), errno);
    }
}

struct InprocEndpoint {
    registry: Arc<InprocRegistry>,
    endpoint: Endpoint,
    name: String,
    kind: EndpointKind,
    peer: Arc<Peer>,
}

impl EndpointHandle for InprocEndpoint {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn shutdown(self: Box<Self>) {
        self.registry.remove(&self.name, self.kind, &self.peer);
        self.peer.close_links();
        debug!("[INPROC] {:?} {} shut down", self.kind, self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::TestHost;
    use nanolink_core::socket_type::SocketType;

    #[test]
    fn test_bind_then_connect() {
        let registry = Arc::new(InprocRegistry::new());
        let server = TestHost::new(SocketType::Pair);
        let client = TestHost::new(SocketType::Pair);

        let _b = registry.open(EndpointKind::Bind, "a", server.weak()).unwrap();
        let _c = registry.open(EndpointKind::Connect, "a", client.weak()).unwrap();
        assert_eq!(server.pipe_count(), 1);
        assert_eq!(client.pipe_count(), 1);
    }

    #[test]
    fn test_connect_before_bind_and_rebind() {
        let registry = Arc::new(InprocRegistry::new());
        let server = TestHost::new(SocketType::Push);
        let client = TestHost::new(SocketType::Pull);

        let _c = registry.open(EndpointKind::Connect, "late", client.weak()).unwrap();
        assert_eq!(client.pipe_count(), 0);

        let b = registry.open(EndpointKind::Bind, "late", server.weak()).unwrap();
        assert_eq!(client.pipe_count(), 1);
        b.shutdown();
        assert_eq!(client.closed_pipes(), 1);

        let _b = registry.open(EndpointKind::Bind, "late", server.weak()).unwrap();
        assert_eq!(client.pipe_count(), 2);
    }

    #[test]
    fn test_double_bind() {
        let registry = Arc::new(InprocRegistry::new());
        let first = TestHost::new(SocketType::Bus);
        let second = TestHost::new(SocketType::Bus);

        let _b = registry.open(EndpointKind::Bind, "x", first.weak()).unwrap();
        assert_eq!(
            registry.open(EndpointKind::Bind, "x", second.weak()).err(),
            Some(Errno::AddrInUse)
        );
    }

    #[test]
    fn test_incompatible_peers_ignored() {
        let registry = Arc::new(InprocRegistry::new());
        let server = TestHost::new(SocketType::Pub);
        let client = TestHost::new(SocketType::Pull);

        let _b = registry.open(EndpointKind::Bind, "y", server.weak()).unwrap();
        let _c = registry.open(EndpointKind::Connect, "y", client.weak()).unwrap();
        assert_eq!(server.pipe_count(), 0);
        assert_eq!(client.pipe_count(), 0);
    }

    #[test]
    fn test_shutdown_releases_name() {
        let registry = Arc::new(InprocRegistry::new());
        let host = TestHost::new(SocketType::Pair);
        let b = registry.open(EndpointKind::Bind, "z", host.weak()).unwrap();
        assert_eq!(registry.len(), 1);
        b.shutdown();
        assert!(registry.is_empty());
    }
}
