//! Payload bookkeeping - everything between frames and requests.
//!
//! - [`StreamManager`] owns the assemblers of inbound content streams
//! - [`PayloadAssemblerManager`] owns request/response envelope assemblers
//!   and turns finished envelopes into [`PayloadEvent`]s
//! - [`RequestManager`] correlates outbound requests with their responses
//! - [`SendOperations`] disassembles outbound requests, responses and cancels

mod assembler_manager;
mod envelope;
mod request_manager;
mod send_operations;
mod stream_manager;

use uuid::Uuid;

use crate::protocol::Header;
use crate::request::ReceiveRequest;
use crate::response::ReceiveResponse;

pub use assembler_manager::PayloadAssemblerManager;
pub use envelope::{RequestPayload, ResponsePayload, StreamDescription};
pub use request_manager::{PendingResponse, RequestManager};
pub use send_operations::SendOperations;
pub use stream_manager::StreamManager;

/// Work produced by the inbound side for the protocol adapter.
#[derive(Debug)]
pub enum PayloadEvent {
    /// A request envelope was fully assembled.
    Request(Uuid, ReceiveRequest),
    /// A response envelope was fully assembled.
    Response(Uuid, ReceiveResponse),
    /// A local reader abandoned an inbound stream; tell the peer.
    CancelStream(Uuid),
    /// The peer sent a `cancelStream` or `cancelAll` frame.
    PeerCancel(Header),
}
