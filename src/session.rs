//! Streaming session - lifecycle of one logical endpoint.
//!
//! A session outlives individual connections. Each [`attach`](StreamingSession::attach)
//! builds a fresh sender, receiver, request manager and protocol adapter
//! over the given transport halves. A disconnect reported by either half
//! tears the whole connection down:
//! 1. Close sender and receiver
//! 2. Reject every pending request with the disconnect reason
//! 3. Move to [`ConnectionState::Disconnected`]
//! 4. Invoke the disconnection handler (once per connection)

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use crate::error::{Result, StreamingError};
use crate::handler::RequestHandler;
use crate::payload_transport::{PayloadReceiver, PayloadSender, TransportDisconnectedEvent};
use crate::payloads::RequestManager;
use crate::protocol_adapter::ProtocolAdapter;
use crate::request::StreamingRequest;
use crate::response::ReceiveResponse;
use crate::transport::{TransportReceiver, TransportSender};

/// Reason given to pending requests when the local side disconnects.
pub const DISCONNECT_REASON: &str = "Disconnect was called.";

/// Callback invoked when a connection goes away.
pub type DisconnectionHandler = Arc<dyn Fn(&TransportDisconnectedEvent) + Send + Sync>;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything owned by one live connection.
struct Connection {
    sender: Arc<PayloadSender>,
    receiver: PayloadReceiver,
    adapter: Arc<ProtocolAdapter>,
    request_manager: Arc<RequestManager>,
    closed: AtomicBool,
}

/// One endpoint of the protocol, reusable across reconnects.
pub struct StreamingSession {
    request_handler: Option<Arc<dyn RequestHandler>>,
    disconnection_handler: Option<DisconnectionHandler>,
    state: watch::Sender<ConnectionState>,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl StreamingSession {
    pub fn new(
        request_handler: Option<Arc<dyn RequestHandler>>,
        disconnection_handler: Option<DisconnectionHandler>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            request_handler,
            disconnection_handler,
            state,
            connection: Mutex::new(None),
        })
    }

    fn connection(&self) -> MutexGuard<'_, Option<Arc<Connection>>> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the session is disconnected. Returns at once if it already is.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }

    /// Mark a connection attempt as started.
    pub(crate) fn set_connecting(&self) {
        self.state.send_replace(ConnectionState::Connecting);
    }

    /// Mark a connection attempt as failed.
    pub(crate) fn set_connect_failed(&self) {
        if self.connection().is_none() {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Start a connection over the given transport halves.
    pub async fn attach(
        self: &Arc<Self>,
        sender: Box<dyn TransportSender>,
        receiver: Box<dyn TransportReceiver>,
    ) -> Result<()> {
        if self.connection().is_some() {
            return Err(StreamingError::Protocol("Session is already connected".to_string()));
        }

        let (disconnects_tx, mut disconnects_rx) = mpsc::unbounded_channel();
        let payload_sender = Arc::new(PayloadSender::new(disconnects_tx.clone()));
        let payload_receiver = PayloadReceiver::new(disconnects_tx);
        let request_manager = RequestManager::new();
        let adapter = ProtocolAdapter::new(
            self.request_handler.clone(),
            request_manager.clone(),
            payload_sender.clone(),
            &payload_receiver,
        );

        payload_sender.connect(sender).await;
        payload_receiver.connect(receiver)?;

        let connection = Arc::new(Connection {
            sender: payload_sender,
            receiver: payload_receiver,
            adapter,
            request_manager,
            closed: AtomicBool::new(false),
        });

        *self.connection() = Some(connection.clone());
        self.state.send_replace(ConnectionState::Connected);

        let session = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(event) = disconnects_rx.recv().await else {
                return;
            };
            if let Some(session) = session.upgrade() {
                session.teardown(&connection, event).await;
            }
        });

        Ok(())
    }

    /// Send a request over the current connection and wait for the response.
    pub async fn send_request(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        let adapter = self
            .connection()
            .as_ref()
            .map(|connection| connection.adapter.clone())
            .ok_or(StreamingError::NotConnected)?;

        adapter.send_request(request).await
    }

    /// Close the current connection, rejecting pending requests with
    /// [`DISCONNECT_REASON`].
    pub async fn disconnect(&self) {
        let connection = self.connection().clone();
        if let Some(connection) = connection {
            self.teardown(&connection, TransportDisconnectedEvent::new(DISCONNECT_REASON))
                .await;
        }
    }

    async fn teardown(&self, connection: &Arc<Connection>, event: TransportDisconnectedEvent) {
        if connection.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!("Connection closed: {}", event);
        connection.receiver.disconnect();
        connection.request_manager.reject_all(&event.to_string());
        connection.adapter.assembler_manager().close_all();

        {
            let mut current = self.connection();
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, connection)) {
                *current = None;
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);

        // Last: closing the transport may wait on the peer.
        connection.sender.disconnect(Some(event.clone())).await;

        if let Some(handler) = &self.disconnection_handler {
            handler(&event);
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Some(connection) = self.connection().take() {
            connection.receiver.disconnect();
        }
    }
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("state", &self.state())
            .field("has_request_handler", &self.request_handler.is_some())
            .finish()
    }
}
