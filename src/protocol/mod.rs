//! Protocol module - wire header, payload types and frames.
//!
//! This module implements the framing layer shared by every transport:
//! - 48-byte ASCII header encoding/decoding
//! - Payload type discriminator
//! - Frame struct pairing a header with one payload chunk

mod frame;
mod header;
mod payload_type;

pub use frame::Frame;
pub use header::{
    Header, DELIMITER, HEADER_SIZE, MAX_LENGTH, MAX_PAYLOAD_LENGTH, MIN_LENGTH, TERMINATOR,
};
pub use payload_type::PayloadType;
