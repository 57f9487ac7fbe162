//! Header encoding and decoding.
//!
//! Implements the fixed 48-byte ASCII header:
//! ```text
//! ┌──────┬───┬────────┬───┬──────────────────────┬───┬─────┬────┐
//! │ Type │ . │ Length │ . │ ID                   │ . │ End │ \n │
//! │ 1    │ 1 │ 6      │ 1 │ 36 (UUID v4)         │ 1 │ 1   │ 1  │
//! └──────┴───┴────────┴───┴──────────────────────┴───┴─────┴────┘
//! ```
//!
//! Length is zero-padded decimal, the end flag is `'0'` or `'1'`.

use uuid::{Uuid, Variant};

use super::payload_type::PayloadType;
use crate::error::{Result, StreamingError};

/// Header size in bytes (fixed, exactly 48).
pub const HEADER_SIZE: usize = 48;

/// Maximum number of payload bytes the sender puts in one frame.
pub const MAX_PAYLOAD_LENGTH: usize = 4096;

/// Largest value the 6-digit length field can carry.
pub const MAX_LENGTH: u32 = 999_999;

/// Smallest legal length field value.
pub const MIN_LENGTH: u32 = 0;

/// Field delimiter.
pub const DELIMITER: u8 = b'.';

/// Header terminator.
pub const TERMINATOR: u8 = b'\n';

const TYPE_OFFSET: usize = 0;
const TYPE_DELIMITER_OFFSET: usize = 1;
const LENGTH_OFFSET: usize = 2;
const LENGTH_LENGTH: usize = 6;
const LENGTH_DELIMITER_OFFSET: usize = 8;
const ID_OFFSET: usize = 9;
const ID_LENGTH: usize = 36;
const ID_DELIMITER_OFFSET: usize = 45;
const END_OFFSET: usize = 46;
const TERMINATOR_OFFSET: usize = 47;

/// Header of one frame of one logical payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Kind of payload this frame belongs to.
    pub payload_type: PayloadType,
    /// Number of payload bytes following this header.
    pub payload_length: u32,
    /// Logical payload identifier shared by all of its frames.
    pub id: Uuid,
    /// Set on the final frame of the logical payload.
    pub end: bool,
}

impl Header {
    /// Create a new header.
    pub fn new(payload_type: PayloadType, payload_length: u32, id: Uuid, end: bool) -> Self {
        Self {
            payload_type,
            payload_length,
            id,
            end,
        }
    }

    /// Encode header to its 48 ASCII bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use streamwire::protocol::{Header, PayloadType, HEADER_SIZE};
    /// use uuid::Uuid;
    ///
    /// let header = Header::new(PayloadType::Stream, 42, Uuid::new_v4(), true);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..9], b"S.000042.");
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (48 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        debug_assert!(self.payload_length <= MAX_LENGTH);

        buf[TYPE_OFFSET] = self.payload_type.as_byte();
        buf[TYPE_DELIMITER_OFFSET] = DELIMITER;

        let mut length = self.payload_length;
        for slot in buf[LENGTH_OFFSET..LENGTH_OFFSET + LENGTH_LENGTH].iter_mut().rev() {
            *slot = b'0' + (length % 10) as u8;
            length /= 10;
        }
        buf[LENGTH_DELIMITER_OFFSET] = DELIMITER;

        self.id
            .hyphenated()
            .encode_lower(&mut buf[ID_OFFSET..ID_OFFSET + ID_LENGTH]);
        buf[ID_DELIMITER_OFFSET] = DELIMITER;

        buf[END_OFFSET] = if self.end { b'1' } else { b'0' };
        buf[TERMINATOR_OFFSET] = TERMINATOR;
    }

    /// Decode and validate a header.
    ///
    /// Fails when the buffer is shorter than 48 bytes, the field count is not
    /// four, the type is not a single known character, the length is not six
    /// digits within `[MIN_LENGTH, MAX_LENGTH]`, the ID is not a 36-character
    /// UUID v4, or the end flag is not `"0\n"` / `"1\n"`.
    ///
    /// # Example
    ///
    /// ```
    /// use streamwire::protocol::{Header, PayloadType};
    ///
    /// let bytes = b"A.000005.c1c3a2d4-5e6f-4a1b-8c2d-3e4f5a6b7c8d.1\n";
    /// let header = Header::decode(bytes).unwrap();
    /// assert_eq!(header.payload_type, PayloadType::Request);
    /// assert_eq!(header.payload_length, 5);
    /// assert!(header.end);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(StreamingError::InvalidHeader(format!(
                "Header must be {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let text = std::str::from_utf8(&buf[..HEADER_SIZE])
            .map_err(|_| StreamingError::InvalidHeader("Header is not ASCII".to_string()))?;

        let fields: Vec<&str> = text.split(DELIMITER as char).collect();
        if fields.len() != 4 {
            return Err(StreamingError::InvalidHeader(format!(
                "Expected 4 fields, got {}",
                fields.len()
            )));
        }

        let type_field = fields[0].as_bytes();
        if type_field.len() != 1 {
            return Err(StreamingError::InvalidHeader(
                "Type must be a single character".to_string(),
            ));
        }
        let payload_type = PayloadType::from_byte(type_field[0])?;

        let payload_length = parse_length(fields[1])?;
        let id = parse_id(fields[2])?;

        let end = match fields[3] {
            "0\n" => false,
            "1\n" => true,
            other => {
                return Err(StreamingError::InvalidHeader(format!(
                    "End flag must be 0 or 1, got {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            payload_type,
            payload_length,
            id,
            end,
        })
    }

    /// Check if this frame carries a cancellation.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.payload_type.is_control()
    }
}

fn parse_length(field: &str) -> Result<u32> {
    if field.len() != LENGTH_LENGTH || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StreamingError::InvalidHeader(format!(
            "Length must be {} digits, got {:?}",
            LENGTH_LENGTH, field
        )));
    }

    let length: u32 = field
        .parse()
        .map_err(|_| StreamingError::InvalidHeader(format!("Unparseable length {:?}", field)))?;

    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(StreamingError::InvalidHeader(format!(
            "Length {} outside [{}, {}]",
            length, MIN_LENGTH, MAX_LENGTH
        )));
    }

    Ok(length)
}

fn parse_id(field: &str) -> Result<Uuid> {
    if field.len() != ID_LENGTH {
        return Err(StreamingError::InvalidHeader(format!(
            "ID must be {} characters, got {}",
            ID_LENGTH,
            field.len()
        )));
    }

    let id = Uuid::try_parse(field)
        .map_err(|e| StreamingError::InvalidHeader(format!("ID is not a UUID: {}", e)))?;

    if id.get_version_num() != 4 || id.get_variant() != Variant::RFC4122 {
        return Err(StreamingError::InvalidHeader(format!(
            "ID {} is not a version 4 UUID",
            field
        )));
    }

    Ok(id)
}
