//! Payload type discriminator carried in the first header byte.

use std::fmt;

use crate::error::{Result, StreamingError};

/// Kind of logical payload a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Request envelope (`A`).
    Request,
    /// Response envelope (`B`).
    Response,
    /// Content stream attached to a request or response (`S`).
    Stream,
    /// Cancel every in-flight stream (`X`).
    CancelAll,
    /// Cancel a single stream (`C`).
    CancelStream,
}

impl PayloadType {
    /// Wire byte for this payload type.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            PayloadType::Request => b'A',
            PayloadType::Response => b'B',
            PayloadType::Stream => b'S',
            PayloadType::CancelAll => b'X',
            PayloadType::CancelStream => b'C',
        }
    }

    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'A' => Ok(PayloadType::Request),
            b'B' => Ok(PayloadType::Response),
            b'S' => Ok(PayloadType::Stream),
            b'X' => Ok(PayloadType::CancelAll),
            b'C' => Ok(PayloadType::CancelStream),
            other => Err(StreamingError::InvalidHeader(format!(
                "Unknown payload type {:?}",
                other as char
            ))),
        }
    }

    /// Request or response envelope.
    #[inline]
    pub fn is_envelope(self) -> bool {
        matches!(self, PayloadType::Request | PayloadType::Response)
    }

    /// Cancellation control frame.
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(self, PayloadType::CancelAll | PayloadType::CancelStream)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_byte() as char)
    }
}
