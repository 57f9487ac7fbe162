//! Protocol adapter - the per-connection orchestrator.
//!
//! Outbound, it registers a request with the [`RequestManager`] and sends it.
//! Inbound, it consumes [`PayloadEvent`]s from the assembler side:
//! requests go to the [`RequestHandler`] and their responses are sent back,
//! responses resolve pending requests, and cancellations travel in both
//! directions.
//!
//! # Architecture
//!
//! ```text
//! PayloadReceiver ─► PayloadAssemblerManager ─► mpsc<PayloadEvent> ─► dispatcher task
//!                           │                                           │
//!                     StreamManager                       RequestHandler / RequestManager
//!                                                                       │
//!                                        PayloadSender ◄─ SendOperations
//! ```

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::error::Result;
use crate::handler::RequestHandler;
use crate::payload_transport::{PayloadReceiver, PayloadSender};
use crate::payloads::{PayloadAssemblerManager, PayloadEvent, RequestManager, SendOperations, StreamManager};
use crate::protocol::PayloadType;
use crate::request::{ReceiveRequest, StreamingRequest};
use crate::response::{ReceiveResponse, StreamingResponse};

/// Default maximum number of requests handled concurrently.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Wires sender, receiver, managers and the request handler together.
pub struct ProtocolAdapter {
    request_handler: Option<Arc<dyn RequestHandler>>,
    request_manager: Arc<RequestManager>,
    sender: Arc<PayloadSender>,
    send_operations: SendOperations,
    assembler_manager: Arc<PayloadAssemblerManager>,
    handler_permits: Arc<Semaphore>,
}

impl ProtocolAdapter {
    /// Create an adapter and subscribe it to `receiver`.
    ///
    /// Spawns the dispatcher task, so this must run inside a tokio runtime.
    pub fn new(
        request_handler: Option<Arc<dyn RequestHandler>>,
        request_manager: Arc<RequestManager>,
        sender: Arc<PayloadSender>,
        receiver: &PayloadReceiver,
    ) -> Arc<Self> {
        Self::with_max_concurrent_handlers(
            request_handler,
            request_manager,
            sender,
            receiver,
            DEFAULT_MAX_CONCURRENT_HANDLERS,
        )
    }

    /// Like [`new`](Self::new), with a custom handler concurrency limit.
    ///
    /// Requests arriving while the limit is reached are answered with 503.
    pub fn with_max_concurrent_handlers(
        request_handler: Option<Arc<dyn RequestHandler>>,
        request_manager: Arc<RequestManager>,
        sender: Arc<PayloadSender>,
        receiver: &PayloadReceiver,
        max_concurrent_handlers: usize,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stream_manager = StreamManager::new(events_tx.clone());
        let assembler_manager = Arc::new(PayloadAssemblerManager::new(stream_manager, events_tx));
        receiver.subscribe(assembler_manager.clone());

        let adapter = Arc::new(Self {
            request_handler,
            request_manager,
            send_operations: SendOperations::new(sender.clone()),
            sender,
            assembler_manager,
            handler_permits: Arc::new(Semaphore::new(max_concurrent_handlers)),
        });

        tokio::spawn(Self::dispatch_loop(Arc::downgrade(&adapter), events_rx));
        adapter
    }

    /// Send a request and wait for the peer's response.
    pub async fn send_request(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        let id = Uuid::new_v4();
        let pending = self.request_manager.register(id)?;

        self.send_operations.send_request(id, &request).await?;
        pending.await
    }

    pub fn request_manager(&self) -> &Arc<RequestManager> {
        &self.request_manager
    }

    pub fn assembler_manager(&self) -> &Arc<PayloadAssemblerManager> {
        &self.assembler_manager
    }

    async fn dispatch_loop(adapter: Weak<Self>, mut events: mpsc::UnboundedReceiver<PayloadEvent>) {
        while let Some(event) = events.recv().await {
            let Some(adapter) = adapter.upgrade() else {
                break;
            };
            adapter.dispatch(event);
        }
    }

    fn dispatch(&self, event: PayloadEvent) {
        match event {
            PayloadEvent::Request(id, request) => self.on_receive_request(id, request),
            PayloadEvent::Response(id, response) => {
                if !self.request_manager.signal_response(id, response) {
                    tracing::debug!("Ignoring response {} with no pending request", id);
                }
            }
            PayloadEvent::CancelStream(id) => {
                // A slow transport must not stall responses queued behind this.
                let send_operations = self.send_operations.clone();
                tokio::spawn(async move {
                    if let Err(e) = send_operations.send_cancel_stream(id).await {
                        tracing::warn!("Failed to cancel stream {}: {}", id, e);
                    }
                });
            }
            PayloadEvent::PeerCancel(header) => match header.payload_type {
                PayloadType::CancelStream => self.sender.cancel_stream(header.id),
                PayloadType::CancelAll => self.sender.cancel_all(),
                other => tracing::warn!("Unexpected control payload {}", other),
            },
        }
    }

    fn on_receive_request(&self, id: Uuid, request: ReceiveRequest) {
        let Some(handler) = self.request_handler.clone() else {
            tracing::debug!("No request handler; dropping {} {}", request.verb, request.path);
            return;
        };

        let send_operations = self.send_operations.clone();

        // Try to acquire a handler permit
        let permit = match self.handler_permits.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!("Handler capacity reached, rejecting {} {}", request.verb, request.path);
                tokio::spawn(async move {
                    let busy = StreamingResponse::create(503, None);
                    if let Err(e) = send_operations.send_response(id, &busy).await {
                        tracing::warn!("Failed to send response {}: {}", id, e);
                    }
                });
                return;
            }
        };

        tokio::spawn(async move {
            // Permit is held until the response is sent
            let _permit = permit;

            let Some(response) = handler.process_request(request).await else {
                return;
            };
            if let Err(e) = send_operations.send_response(id, &response).await {
                tracing::warn!("Failed to send response {}: {}", id, e);
            }
        });
    }
}
