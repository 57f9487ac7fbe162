use uuid::Uuid;

use super::{PayloadDisassembler, StreamWrapper};
use crate::content::HttpContentStream;
use crate::error::Result;
use crate::protocol::PayloadType;

/// Sends the body bytes of one content stream as a `stream` payload.
pub struct HttpContentStreamDisassembler {
    id: Uuid,
    wrapper: StreamWrapper,
}

impl HttpContentStreamDisassembler {
    pub fn new(content_stream: &HttpContentStream) -> Self {
        Self {
            id: content_stream.id,
            wrapper: StreamWrapper::new(content_stream.content.body().clone()),
        }
    }
}

impl PayloadDisassembler for HttpContentStreamDisassembler {
    fn payload_type(&self) -> PayloadType {
        PayloadType::Stream
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn get_stream(&self) -> Result<StreamWrapper> {
        Ok(self.wrapper.clone())
    }
}
