//! Named pipe client and server.
//!
//! A connection uses two one-way pipes derived from a base name: the client
//! writes `<base>.incoming` and reads `<base>.outgoing`; the server does the
//! opposite.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::NamedPipeClient;
//!
//! let client = NamedPipeClient::builder("bot")
//!     .auto_reconnect(false)
//!     .build()?;
//! client.connect().await?;
//! let response = client.send(StreamingRequest::new(verb::GET, "/health")).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::{Result, StreamingError};
use crate::handler::RequestHandler;
use crate::payload_transport::TransportDisconnectedEvent;
use crate::request::StreamingRequest;
use crate::response::ReceiveResponse;
use crate::session::{ConnectionState, DisconnectionHandler, StreamingSession};
use crate::transport::{
    connect_pipe, pipe_path, PipeListener, StreamReceiver, StreamSender, INCOMING_SUFFIX, OUTGOING_SUFFIX,
};

/// Default delay before an automatic reconnect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

fn require_base_name(base_name: &str) -> Result<String> {
    if base_name.is_empty() {
        return Err(StreamingError::MissingParameter("base_name"));
    }
    Ok(base_name.to_string())
}

/// Server end of a named pipe connection.
pub struct NamedPipeServer {
    base_name: String,
    session: Arc<StreamingSession>,
}

impl NamedPipeServer {
    /// Create a server for `base_name`.
    pub fn new(base_name: &str, request_handler: Option<Arc<dyn RequestHandler>>) -> Result<Self> {
        Ok(Self {
            base_name: require_base_name(base_name)?,
            session: StreamingSession::new(request_handler, None),
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Listen on both pipes and wait for a client to connect to each.
    ///
    /// Fails if another server already owns the name.
    pub async fn start(&self) -> Result<()> {
        self.session.set_connecting();

        let result = async {
            let incoming = PipeListener::bind(&pipe_path(&self.base_name, INCOMING_SUFFIX)).await?;
            let outgoing = PipeListener::bind(&pipe_path(&self.base_name, OUTGOING_SUFFIX)).await?;
            let (read, write) = tokio::try_join!(incoming.accept(), outgoing.accept())?;

            tracing::debug!("Named pipe server {} connected", self.base_name);
            self.session
                .attach(Box::new(StreamSender::new(write)), Box::new(StreamReceiver::new(read)))
                .await
        }
        .await;

        if result.is_err() {
            self.session.set_connect_failed();
        }
        result
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

/// Builder for configuring a [`NamedPipeClient`].
pub struct NamedPipeClientBuilder {
    base_name: String,
    request_handler: Option<Arc<dyn RequestHandler>>,
    disconnection_handler: Option<DisconnectionHandler>,
    auto_reconnect: bool,
    reconnect_delay: Duration,
}

impl NamedPipeClientBuilder {
    fn new(base_name: &str) -> Self {
        Self {
            base_name: base_name.to_string(),
            request_handler: None,
            disconnection_handler: None,
            auto_reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Serve requests sent by the server.
    pub fn request_handler<H: RequestHandler>(mut self, handler: H) -> Self {
        self.request_handler = Some(Arc::new(handler));
        self
    }

    /// Called every time the connection goes away.
    pub fn disconnection_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TransportDisconnectedEvent) + Send + Sync + 'static,
    {
        self.disconnection_handler = Some(Arc::new(handler));
        self
    }

    /// Reconnect after an unexpected disconnect.
    ///
    /// Default: true
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Delay between reconnect attempts.
    ///
    /// Default: 1 second
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn build(self) -> Result<NamedPipeClient> {
        let base_name = require_base_name(&self.base_name)?;
        Ok(NamedPipeClient {
            inner: Arc::new(ClientInner {
                base_name,
                auto_reconnect: self.auto_reconnect,
                reconnect_delay: self.reconnect_delay,
                session: StreamingSession::new(self.request_handler, self.disconnection_handler),
                disconnecting: AtomicBool::new(false),
                watching: AtomicBool::new(false),
            }),
        })
    }
}

struct ClientInner {
    base_name: String,
    auto_reconnect: bool,
    reconnect_delay: Duration,
    session: Arc<StreamingSession>,
    disconnecting: AtomicBool,
    watching: AtomicBool,
}

impl ClientInner {
    async fn connect_once(&self) -> Result<()> {
        self.session.set_connecting();

        let result = async {
            // The server binds outgoing last, so once it connects incoming is
            // listening too and no half-open attempt is left queued.
            let read = connect_pipe(&pipe_path(&self.base_name, OUTGOING_SUFFIX)).await?;
            let write = connect_pipe(&pipe_path(&self.base_name, INCOMING_SUFFIX)).await?;
            self.session
                .attach(Box::new(StreamSender::new(write)), Box::new(StreamReceiver::new(read)))
                .await
        }
        .await;

        if result.is_err() {
            self.session.set_connect_failed();
        }
        result
    }

    async fn reconnect_loop(inner: Weak<ClientInner>) {
        loop {
            let Some(session) = inner.upgrade().map(|i| i.session.clone()) else {
                return;
            };
            session.closed().await;

            let Some(client) = inner.upgrade() else {
                return;
            };
            if client.disconnecting.load(Ordering::Acquire) {
                client.watching.store(false, Ordering::Release);
                return;
            }
            let delay = client.reconnect_delay;
            drop(client);

            tokio::time::sleep(delay).await;

            let Some(client) = inner.upgrade() else {
                return;
            };
            if client.disconnecting.load(Ordering::Acquire) {
                client.watching.store(false, Ordering::Release);
                return;
            }
            if client.session.state() == ConnectionState::Disconnected {
                tracing::debug!("Reconnecting to named pipe {}", client.base_name);
                if let Err(e) = client.connect_once().await {
                    tracing::warn!("Reconnect to {} failed: {}", client.base_name, e);
                }
            }
        }
    }
}

/// Client end of a named pipe connection.
pub struct NamedPipeClient {
    inner: Arc<ClientInner>,
}

impl NamedPipeClient {
    /// Create a new client builder.
    pub fn builder(base_name: &str) -> NamedPipeClientBuilder {
        NamedPipeClientBuilder::new(base_name)
    }

    pub fn base_name(&self) -> &str {
        &self.inner.base_name
    }

    /// Connect both pipes of a listening server.
    pub async fn connect(&self) -> Result<()> {
        self.inner.disconnecting.store(false, Ordering::Release);
        self.inner.connect_once().await?;

        if self.inner.auto_reconnect && !self.inner.watching.swap(true, Ordering::AcqRel) {
            tokio::spawn(ClientInner::reconnect_loop(Arc::downgrade(&self.inner)));
        }
        Ok(())
    }

    /// Send a request to the server.
    pub async fn send(&self, request: StreamingRequest) -> Result<ReceiveResponse> {
        self.inner.session.send_request(request).await
    }

    /// Disconnect without reconnecting.
    pub async fn disconnect(&self) {
        self.inner.disconnecting.store(true, Ordering::Release);
        self.inner.session.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_connected()
    }

    pub fn session(&self) -> &Arc<StreamingSession> {
        &self.inner.session
    }
}
