//! # streamwire
//!
//! Multiplexed request/response streaming over a single full-duplex
//! connection.
//!
//! Both ends of a connection can send requests and answer them. Requests,
//! responses and their bodies travel as framed payloads with a 48-byte
//! ASCII header, so many exchanges share one WebSocket or named pipe.
//!
//! ## Architecture
//!
//! - **Transport**: WebSocket or a pair of one-way named pipes
//! - **Payload layer**: framing, chunking, reassembly and cancellation
//! - **Session**: connection lifecycle, pending requests and the request handler
//!
//! ## Example
//!
//! ```ignore
//! use streamwire::{verb, NamedPipeClient, NamedPipeServer, Router, StreamingRequest, StreamingResponse};
//!
//! #[tokio::main]
//! async fn main() -> streamwire::Result<()> {
//!     let mut router = Router::new();
//!     router.route(verb::GET, "/health", |_request| async {
//!         Some(StreamingResponse::ok())
//!     });
//!
//!     let server = NamedPipeServer::new("bot", Some(std::sync::Arc::new(router)))?;
//!     server.start().await?;
//!
//!     let response = server.send(StreamingRequest::new(verb::GET, "/ping")).await?;
//!     println!("{}", response.status_code);
//!     Ok(())
//! }
//! ```

pub mod assemblers;
pub mod content;
pub mod disassemblers;
pub mod error;
pub mod handler;
pub mod named_pipe;
pub mod payload_transport;
pub mod payloads;
pub mod protocol;
pub mod protocol_adapter;
pub mod request;
pub mod response;
pub mod session;
pub mod subscribable_stream;
pub mod transport;
pub mod websocket;

pub use content::{ContentStream, HttpContent, HttpContentStream};
pub use error::{Result, StreamingError};
pub use handler::{handler_fn, RequestHandler, Router};
pub use named_pipe::{NamedPipeClient, NamedPipeServer};
pub use payload_transport::TransportDisconnectedEvent;
pub use protocol_adapter::ProtocolAdapter;
pub use request::{verb, ReceiveRequest, StreamingRequest};
pub use response::{ReceiveResponse, StreamingResponse};
pub use session::{ConnectionState, StreamingSession};
pub use subscribable_stream::SubscribableStream;
pub use websocket::{WebSocketClient, WebSocketServer};
