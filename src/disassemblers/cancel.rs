use uuid::Uuid;

use super::{PayloadDisassembler, StreamWrapper};
use crate::error::Result;
use crate::protocol::PayloadType;

/// Sends a zero-length `cancelStream` or `cancelAll` frame.
pub struct CancelDisassembler {
    id: Uuid,
    payload_type: PayloadType,
}

impl CancelDisassembler {
    pub fn new(id: Uuid, payload_type: PayloadType) -> Self {
        Self { id, payload_type }
    }
}

impl PayloadDisassembler for CancelDisassembler {
    fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn get_stream(&self) -> Result<StreamWrapper> {
        Ok(StreamWrapper::default())
    }
}
