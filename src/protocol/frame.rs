//! Frame struct: one header plus at most one chunk of payload.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use streamwire::protocol::{Frame, Header, PayloadType, HEADER_SIZE};
//! use bytes::Bytes;
//! use uuid::Uuid;
//!
//! let header = Header::new(PayloadType::Stream, 5, Uuid::new_v4(), true);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(frame.encode().len(), HEADER_SIZE + 5);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::header::{Header, HEADER_SIZE};
use crate::error::{Result, StreamingError};

/// A single wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a header-only frame.
    pub fn empty(header: Header) -> Self {
        Self {
            header,
            payload: Bytes::new(),
        }
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Split a captured byte sequence back into frames.
    ///
    /// Fails on a malformed header or a truncated trailing frame.
    pub fn decode_all(mut bytes: Bytes) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();

        while !bytes.is_empty() {
            if bytes.len() < HEADER_SIZE {
                return Err(StreamingError::Protocol(format!(
                    "Truncated header: {} bytes left",
                    bytes.len()
                )));
            }
            let header = Header::decode(&bytes.split_to(HEADER_SIZE))?;

            let length = header.payload_length as usize;
            if bytes.len() < length {
                return Err(StreamingError::Protocol(format!(
                    "Truncated payload: need {}, have {}",
                    length,
                    bytes.len()
                )));
            }
            frames.push(Frame::new(header, bytes.split_to(length)));
        }

        Ok(frames)
    }
}
