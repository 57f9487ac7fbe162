//! Inbound half of a connection.
//!
//! The receive loop reads one 48-byte header, then the frame's payload in
//! reads of at most [`MAX_PAYLOAD_LENGTH`] bytes, writing each read straight
//! into the target stream. Stream payloads are reported to the sink after
//! every read so consumers can start on large bodies early; request and
//! response payloads are reported once per frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TransportDisconnectedEvent;
use crate::error::{Result, StreamingError};
use crate::protocol::{Header, PayloadType, HEADER_SIZE, MAX_PAYLOAD_LENGTH};
use crate::subscribable_stream::SubscribableStream;
use crate::transport::TransportReceiver;

/// Destination for received frames.
pub trait ReceiveSink: Send + Sync + 'static {
    /// Buffer the payload of `header` should be written into.
    ///
    /// `None` discards the payload bytes (e.g. a stream cancelled locally).
    fn get_payload_stream(&self, header: &Header) -> Option<SubscribableStream>;

    /// Bytes described by `header` have been written to the payload stream.
    fn on_receive(&self, header: &Header);

    /// A cancel frame arrived.
    fn on_control(&self, header: &Header);
}

#[derive(Default)]
struct ReceiverState {
    sink: Option<Arc<dyn ReceiveSink>>,
    task: Option<JoinHandle<()>>,
}

/// Runs the receive loop for one connection.
pub struct PayloadReceiver {
    state: Mutex<ReceiverState>,
    connected: Arc<AtomicBool>,
    disconnects: mpsc::UnboundedSender<TransportDisconnectedEvent>,
}

impl PayloadReceiver {
    /// Create a receiver reporting disconnects on `disconnects`.
    pub fn new(disconnects: mpsc::UnboundedSender<TransportDisconnectedEvent>) -> Self {
        Self {
            state: Mutex::new(ReceiverState::default()),
            connected: Arc::new(AtomicBool::new(false)),
            disconnects,
        }
    }

    fn state(&self) -> MutexGuard<'_, ReceiverState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route received payloads to `sink`.
    pub fn subscribe(&self, sink: Arc<dyn ReceiveSink>) {
        self.state().sink = Some(sink);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Start the receive loop on `transport`.
    ///
    /// Must be called from within a tokio runtime, after [`subscribe`](Self::subscribe).
    pub fn connect(&self, transport: Box<dyn TransportReceiver>) -> Result<()> {
        let mut state = self.state();
        let sink = state
            .sink
            .clone()
            .ok_or_else(|| StreamingError::Protocol("Receiver has no subscriber".to_string()))?;

        if state.task.is_some() {
            return Err(StreamingError::Protocol("Receiver is already connected".to_string()));
        }

        self.connected.store(true, Ordering::Release);
        let connected = self.connected.clone();
        let disconnects = self.disconnects.clone();

        state.task = Some(tokio::spawn(async move {
            let mut transport = transport;
            let err = receive_packets(&mut transport, sink.as_ref()).await;
            transport.close().await;

            if connected.swap(false, Ordering::AcqRel) {
                tracing::debug!("Receive loop ended: {}", err);
                let _ = disconnects.send(TransportDisconnectedEvent::new(err.to_string()));
            }
        }));

        Ok(())
    }

    /// Stop the receive loop and close the transport.
    pub fn disconnect(&self) {
        let task = self.state().task.take();
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        if let Some(task) = task {
            task.abort();
        }
        if was_connected {
            let _ = self.disconnects.send(TransportDisconnectedEvent::default());
        }
    }
}

impl Drop for PayloadReceiver {
    fn drop(&mut self) {
        if let Some(task) = self.state().task.take() {
            task.abort();
        }
    }
}

/// Read frames until the transport fails. Always returns the error that ended it.
async fn receive_packets(transport: &mut dyn TransportReceiver, sink: &dyn ReceiveSink) -> StreamingError {
    loop {
        let header = match read_header(transport).await {
            Ok(header) => header,
            Err(e) => return e,
        };

        if let Err(e) = receive_payload(transport, sink, header).await {
            return e;
        }
    }
}

async fn read_header(transport: &mut dyn TransportReceiver) -> Result<Header> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);

    while buf.len() < HEADER_SIZE {
        let chunk = transport.receive(HEADER_SIZE - buf.len()).await?;
        if chunk.is_empty() {
            return Err(StreamingError::Disconnected("Transport returned no data".to_string()));
        }
        buf.extend_from_slice(&chunk);
    }

    Header::decode(&buf)
}

async fn receive_payload(
    transport: &mut dyn TransportReceiver,
    sink: &dyn ReceiveSink,
    header: Header,
) -> Result<()> {
    if header.is_control() {
        discard(transport, header.payload_length as usize).await?;
        sink.on_control(&header);
        return Ok(());
    }

    let stream = sink.get_payload_stream(&header);
    let Some(stream) = stream else {
        tracing::debug!("Discarding {} bytes for cancelled payload {}", header.payload_length, header.id);
        return discard(transport, header.payload_length as usize).await;
    };

    let is_stream = header.payload_type == PayloadType::Stream;
    let mut remaining = header.payload_length as usize;

    while remaining > 0 {
        let chunk = transport.receive(remaining.min(MAX_PAYLOAD_LENGTH)).await?;
        if chunk.is_empty() {
            return Err(StreamingError::Disconnected("Transport returned no data".to_string()));
        }
        let len = chunk.len().min(remaining);
        remaining -= len;
        stream.write(chunk);

        if is_stream {
            let progress = Header::new(header.payload_type, len as u32, header.id, header.end && remaining == 0);
            sink.on_receive(&progress);
        }
    }

    // Zero-length stream frames still need reporting (they may carry `end`).
    if !is_stream || header.payload_length == 0 {
        sink.on_receive(&header);
    }

    Ok(())
}

async fn discard(transport: &mut dyn TransportReceiver, mut remaining: usize) -> Result<()> {
    while remaining > 0 {
        let chunk = transport.receive(remaining.min(MAX_PAYLOAD_LENGTH)).await?;
        if chunk.is_empty() {
            return Err(StreamingError::Disconnected("Transport returned no data".to_string()));
        }
        remaining = remaining.saturating_sub(chunk.len());
    }
    Ok(())
}
