use uuid::Uuid;

use super::{serialize, PayloadDisassembler, StreamWrapper};
use crate::error::Result;
use crate::payloads::ResponsePayload;
use crate::protocol::PayloadType;
use crate::response::StreamingResponse;

/// Sends the envelope of a response, under the ID of the request it answers.
pub struct ResponseDisassembler {
    id: Uuid,
    payload: ResponsePayload,
}

impl ResponseDisassembler {
    pub fn new(id: Uuid, response: &StreamingResponse) -> Self {
        Self {
            id,
            payload: ResponsePayload::from(response),
        }
    }
}

impl PayloadDisassembler for ResponseDisassembler {
    fn payload_type(&self) -> PayloadType {
        PayloadType::Response
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn get_stream(&self) -> Result<StreamWrapper> {
        serialize(&self.payload)
    }
}
