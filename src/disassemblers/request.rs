use uuid::Uuid;

use super::{serialize, PayloadDisassembler, StreamWrapper};
use crate::error::Result;
use crate::payloads::RequestPayload;
use crate::protocol::PayloadType;
use crate::request::StreamingRequest;

/// Sends the envelope of a request. Bodies go separately.
pub struct RequestDisassembler {
    id: Uuid,
    payload: RequestPayload,
}

impl RequestDisassembler {
    pub fn new(id: Uuid, request: &StreamingRequest) -> Self {
        Self {
            id,
            payload: RequestPayload::from(request),
        }
    }
}

impl PayloadDisassembler for RequestDisassembler {
    fn payload_type(&self) -> PayloadType {
        PayloadType::Request
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn get_stream(&self) -> Result<StreamWrapper> {
        serialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::HttpContent;

    #[test]
    fn test_envelope_lists_streams() {
        let mut request = StreamingRequest::new("POST", "/x");
        let stream_id = request.add_stream(HttpContent::text("body"));
        let disassembler = RequestDisassembler::new(Uuid::new_v4(), &request);

        let wrapper = disassembler.get_stream().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&wrapper.stream).unwrap();

        assert_eq!(json["verb"], "POST");
        assert_eq!(json["streams"][0]["id"], stream_id.to_string());
        assert_eq!(json["streams"][0]["length"], 4);
        assert_eq!(wrapper.stream_length, wrapper.stream.len());
    }
}
