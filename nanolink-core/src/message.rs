//! Message type passed between sockets, protocols and pipes.
//!
//! A message is a protocol header (request ids, backtraces, pipe keys) plus
//! the application body. Pipes carry the flattened wire form, header first;
//! receiving protocols split the header back out.

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    header: Bytes,
    body: Bytes,
}

impl Message {
    /// Message with an empty header.
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            header: Bytes::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
        }
    }

    /// Split the first `len` bytes of a wire frame off as the header.
    ///
    /// Returns `None` when the frame is shorter than `len`.
    #[must_use]
    pub fn split_wire(mut wire: Bytes, len: usize) -> Option<Self> {
        if wire.len() < len {
            return None;
        }
        let header = wire.split_to(len);
        Some(Self { header, body: wire })
    }

    #[inline]
    #[must_use]
    pub const fn header(&self) -> &Bytes {
        &self.header
    }

    #[inline]
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_header(&mut self, header: impl Into<Bytes>) {
        self.header = header.into();
    }

    /// Body length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Header and body as one contiguous buffer.
    #[must_use]
    pub fn to_wire(&self) -> Bytes {
        if self.header.is_empty() {
            return self.body.clone();
        }
        let mut out = BytesMut::with_capacity(self.header.len() + self.body.len());
        out.put_slice(&self.header);
        out.put_slice(&self.body);
        out.freeze()
    }

    #[must_use]
    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.header, self.body)
    }
}

impl From<Bytes> for Message {
    fn from(body: Bytes) -> Self {
        Self::new(body)
    }
}

impl From<&'static [u8]> for Message {
    fn from(body: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(body))
    }
}
