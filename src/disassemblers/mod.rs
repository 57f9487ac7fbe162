//! Disassemblers - turn outbound items into payloads for the sender.
//!
//! Each disassembler produces one logical payload (type, ID, bytes). The
//! [`PayloadSender`] does the chunking.
//!
//! - [`RequestDisassembler`] / [`ResponseDisassembler`] - JSON envelopes
//! - [`HttpContentStreamDisassembler`] - raw body bytes of one content stream
//! - [`CancelDisassembler`] - zero-length cancel frames

mod cancel;
mod content_stream;
mod request;
mod response;

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::payload_transport::PayloadSender;
use crate::protocol::{Header, PayloadType, MAX_LENGTH};

pub use cancel::CancelDisassembler;
pub use content_stream::HttpContentStreamDisassembler;
pub use request::RequestDisassembler;
pub use response::ResponseDisassembler;

/// Bytes of one logical payload.
#[derive(Debug, Clone, Default)]
pub struct StreamWrapper {
    pub stream: Bytes,
    pub stream_length: usize,
}

impl StreamWrapper {
    pub fn new(stream: Bytes) -> Self {
        Self {
            stream_length: stream.len(),
            stream,
        }
    }
}

/// Serialize an envelope to JSON.
pub fn serialize<T: Serialize + ?Sized>(item: &T) -> Result<StreamWrapper> {
    Ok(StreamWrapper::new(Bytes::from(serde_json::to_vec(item)?)))
}

/// Something that can be sent as one logical payload.
pub trait PayloadDisassembler: Send + Sync {
    fn payload_type(&self) -> PayloadType;

    fn id(&self) -> Uuid;

    /// Produce the payload bytes.
    fn get_stream(&self) -> Result<StreamWrapper>;

    /// Send the payload through `sender`.
    fn disassemble<'a>(&'a self, sender: &'a PayloadSender) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let wrapper = self.get_stream()?;
            // The length field is rewritten per frame; this is only the logical size.
            let length = wrapper.stream_length.min(MAX_LENGTH as usize) as u32;
            let header = Header::new(self.payload_type(), length, self.id(), true);
            sender.send_payload(header, wrapper.stream).await
        })
    }
}
