//! The scalability-protocol engine: protocol factory plus carriers.

use crate::protocols;
use crate::transport::{self, InprocRegistry};
use nanolink_core::endpoint::Endpoint;
use nanolink_core::protocol::{Engine, EndpointHandle, EndpointKind, PipeHost, ProtoResult, Protocol};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Engine backing one context.
///
/// Owns the context's inproc name registry; inproc names are not shared
/// between contexts.
#[derive(Debug, Default)]
pub struct SpEngine {
    inproc: Arc<InprocRegistry>,
}

impl SpEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for SpEngine {
    fn create_protocol(&self, domain: i32, protocol: i32) -> ProtoResult<Box<dyn Protocol>> {
        protocols::create(domain, protocol)
    }

    fn open(
        &self,
        kind: EndpointKind,
        endpoint: &Endpoint,
        host: Weak<dyn PipeHost>,
    ) -> ProtoResult<Box<dyn EndpointHandle>> {
        transport::open(&self.inproc, kind, endpoint, host)
    }

    fn terminate(&self) {
        debug!("[ENGINE] terminating, {} inproc names registered", self.inproc.len());
        self.inproc.clear();
    }
}
