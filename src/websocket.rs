//! WebSocket client and server.
//!
//! The server side wraps a WebSocket the application has already accepted
//! (for example through `tokio_tungstenite::accept_async`); the client side
//! dials a `ws://` or `wss://` URL itself.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

use crate::error::{Result, StreamingError};
use crate::handler::RequestHandler;
use crate::payload_transport::TransportDisconnectedEvent;
use crate::request::StreamingRequest;
use crate::response::ReceiveResponse;
use crate::session::{DisconnectionHandler, StreamingSession};
use crate::transport::{split_websocket, TransportReceiver, TransportSender};

type TransportPair = (Box<dyn TransportSender>, Box<dyn TransportReceiver>);

/// Server end of a WebSocket connection.
pub struct WebSocketServer {
    transport: Mutex<Option<TransportPair>>,
    session: Arc<StreamingSession>,
}

impl WebSocketServer {
    /// Wrap an accepted WebSocket.
    pub fn new<S>(socket: WebSocketStream<S>, request_handler: Option<Arc<dyn RequestHandler>>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = split_websocket(socket);
        Self {
            transport: Mutex::new(Some((Box::new(sender), Box::new(receiver)))),
            session: StreamingSession::new(request_handler, None),
        }
    }

    /// Start serving. A socket can only be started once.
    pub async fn start(&self) -> Result<()> {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let (sender, receiver) =
            transport.ok_or_else(|| StreamingError::Protocol("WebSocket server already started".to_string()))?;

        self.session.attach(sender, receiver).await
    }

    /// Send a request to the connected client.
    pub async fn send(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.session.send_request(request).await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn session(&self) -> &Arc<StreamingSession> {
        &self.session
    }
}

/// Builder for configuring a [`WebSocketClient`].
pub struct WebSocketClientBuilder {
    url: String,
    request_handler: Option<Arc<dyn RequestHandler>>,
    disconnection_handler: Option<DisconnectionHandler>,
}

impl WebSocketClientBuilder {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_handler: None,
            disconnection_handler: None,
        }
    }

    /// Serve requests sent by the server.
    pub fn request_handler<H: RequestHandler>(mut self, handler: H) -> Self {
        self.request_handler = Some(Arc::new(handler));
        self
    }

    /// Called when the connection goes away.
    pub fn disconnection_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TransportDisconnectedEvent) + Send + Sync + 'static,
    {
        self.disconnection_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<WebSocketClient> {
        if self.url.is_empty() {
            return Err(StreamingError::MissingParameter("url"));
        }
        Ok(WebSocketClient {
            url: self.url,
            session: StreamingSession::new(self.request_handler, self.disconnection_handler),
        })
    }
}

/// Client end of a WebSocket connection.
pub struct WebSocketClient {
    url: String,
    session: Arc<StreamingSession>,
}

impl WebSocketClient {
    /// Create a new client builder.
    pub fn builder(url: &str) -> WebSocketClientBuilder {
        WebSocketClientBuilder::new(url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the WebSocket and start the connection.
    pub async fn connect(&self) -> Result<()> {
        self.session.set_connecting();

        let result = async {
            let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
            let (sender, receiver) = split_websocket(socket);
            self.session.attach(Box::new(sender), Box::new(receiver)).await
        }
        .await;

        if let Err(e) = &result {
            tracing::warn!("WebSocket connect to {} failed: {}", self.url, e);
            self.session.set_connect_failed();
        }
        result
    }

    /// Send a request to the server.
    pub async fn send(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.session.send_request(request).await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn session(&self) -> &Arc<StreamingSession> {
        &self.session
    }
}
