//! SP wire format for stream carriers.
//!
//! A connection starts with an 8-byte protocol header in each direction:
//! `0x00 'S' 'P' 0x00`, the sender's protocol number (u16 BE), then two zero
//! bytes. Messages follow as length-prefixed frames:
//!
//! - TCP: `u64 BE length | payload`
//! - IPC: `0x01 | u64 BE length | payload`

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Protocol header length.
pub const HEADER_LEN: usize = 8;

/// IPC frame type for a normal message.
const IPC_MSG: u8 = 0x01;

/// Largest speculative buffer reservation for a partially received frame.
const MAX_RESERVE: usize = 64 * 1024;

/// Wire format errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid protocol header")]
    InvalidHeader,

    #[error("unknown frame type {0:#04x}")]
    UnknownType(u8),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    TooLarge { size: u64, max: usize },
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, FrameError>;

/// Protocol header announcing `protocol`.
#[must_use]
pub const fn encode_header(protocol: u16) -> [u8; HEADER_LEN] {
    let [hi, lo] = protocol.to_be_bytes();
    [0x00, b'S', b'P', 0x00, hi, lo, 0x00, 0x00]
}

/// Validate a peer's protocol header and return its protocol number.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<u16> {
    if header[..4] != [0x00, b'S', b'P', 0x00] || header[6..] != [0x00, 0x00] {
        return Err(FrameError::InvalidHeader);
    }
    Ok(u16::from_be_bytes([header[4], header[5]]))
}

/// Frame layout of a stream carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Tcp,
    Ipc,
}

impl Framing {
    #[inline]
    const fn prefix_len(self) -> usize {
        match self {
            Self::Tcp => 8,
            Self::Ipc => 9,
        }
    }
}

/// Append one encoded frame to `dst`.
pub fn encode_frame(framing: Framing, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(framing.prefix_len() + payload.len());
    if framing == Framing::Ipc {
        dst.put_u8(IPC_MSG);
    }
    dst.put_u64(payload.len() as u64);
    dst.put_slice(payload);
}

/// Stateful frame decoder
///
/// Fast path:
/// - Entire frame buffered → zero-copy split
///
/// Slow path:
/// - Prefix consumed, body still arriving → remember the length and wait
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    max_size: Option<usize>,
    expected_body_len: Option<usize>,
}

impl FrameDecoder {
    #[must_use]
    pub const fn new(framing: Framing, max_size: Option<usize>) -> Self {
        Self {
            framing,
            max_size,
            expected_body_len: None,
        }
    }

    /// Decode a single frame from `src`
    ///
    /// Returns:
    /// - Ok(Some(payload)) → frame decoded
    /// - Ok(None) → need more data
    /// - Err → protocol violation, the connection must be dropped
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let body_len = match self.expected_body_len {
            Some(len) => len,
            None => {
                let prefix = self.framing.prefix_len();
                if src.len() < prefix {
                    return Ok(None);
                }
                if self.framing == Framing::Ipc && src[0] != IPC_MSG {
                    return Err(FrameError::UnknownType(src[0]));
                }
                let mut len_bytes = &src[prefix - 8..prefix];
                let size = len_bytes.get_u64();
                let max = self.max_size.unwrap_or(usize::MAX);
                let len = usize::try_from(size)
                    .ok()
                    .filter(|len| *len <= max)
                    .ok_or(FrameError::TooLarge { size, max })?;
                src.advance(prefix);
                self.expected_body_len = Some(len);
                len
            }
        };

        if src.len() < body_len {
            src.reserve((body_len - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        self.expected_body_len = None;
        Ok(Some(src.split_to(body_len).freeze()))
    }
}
