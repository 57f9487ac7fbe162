//! Outbound requests, responses and cancellations.
//!
//! The envelope always goes first, then each attached body in order, so the
//! peer knows a body's metadata before its bytes arrive.

use std::sync::Arc;

use uuid::Uuid;

use crate::content::HttpContentStream;
use crate::disassemblers::{
    CancelDisassembler, HttpContentStreamDisassembler, PayloadDisassembler, RequestDisassembler,
    ResponseDisassembler,
};
use crate::error::Result;
use crate::payload_transport::PayloadSender;
use crate::protocol::PayloadType;
use crate::request::StreamingRequest;
use crate::response::StreamingResponse;

/// Sends disassembled items through one [`PayloadSender`].
#[derive(Clone)]
pub struct SendOperations {
    sender: Arc<PayloadSender>,
}

impl SendOperations {
    pub fn new(sender: Arc<PayloadSender>) -> Self {
        Self { sender }
    }

    /// Send a request envelope under `id`, followed by its bodies.
    pub async fn send_request(&self, id: Uuid, request: &StreamingRequest) -> Result<()> {
        RequestDisassembler::new(id, request)
            .disassemble(&self.sender)
            .await?;
        self.send_streams(&request.streams).await
    }

    /// Send the response to request `id`, followed by its bodies.
    pub async fn send_response(&self, id: Uuid, response: &StreamingResponse) -> Result<()> {
        ResponseDisassembler::new(id, response)
            .disassemble(&self.sender)
            .await?;
        self.send_streams(&response.streams).await
    }

    /// Ask the peer to stop sending stream `id`.
    pub async fn send_cancel_stream(&self, id: Uuid) -> Result<()> {
        CancelDisassembler::new(id, PayloadType::CancelStream)
            .disassemble(&self.sender)
            .await
    }

    /// Ask the peer to stop sending every stream.
    pub async fn send_cancel_all(&self) -> Result<()> {
        CancelDisassembler::new(Uuid::new_v4(), PayloadType::CancelAll)
            .disassemble(&self.sender)
            .await
    }

    async fn send_streams(&self, streams: &[HttpContentStream]) -> Result<()> {
        for stream in streams {
            HttpContentStreamDisassembler::new(stream)
                .disassemble(&self.sender)
                .await?;
        }
        Ok(())
    }
}
