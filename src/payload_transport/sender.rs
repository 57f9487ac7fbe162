//! Outbound half of a connection.
//!
//! A logical payload is written as a run of frames, each carrying at most
//! [`MAX_PAYLOAD_LENGTH`] bytes. Only the last frame has `end` set. Frames
//! from concurrent payloads may interleave; the bytes of one frame never do.
//!
//! # Architecture
//!
//! ```text
//! send_request ─┐
//! send_response ┼─► send_payload ─► chunk ─► Mutex<TransportSender> ─► socket
//! cancel ───────┘
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use super::TransportDisconnectedEvent;
use crate::error::{Result, StreamingError};
use crate::protocol::{Frame, Header, PayloadType, MAX_PAYLOAD_LENGTH};
use crate::transport::TransportSender;

/// Upper bound on closing the transport during a disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Stream payloads being written, and the ones the peer asked us to stop.
#[derive(Debug, Default)]
struct Cancellation {
    in_flight: HashSet<Uuid>,
    cancelled: HashSet<Uuid>,
}

/// Chunks logical payloads into frames and writes them to the transport.
pub struct PayloadSender {
    transport: tokio::sync::Mutex<Option<Box<dyn TransportSender>>>,
    connected: AtomicBool,
    cancellation: Mutex<Cancellation>,
    shutdown: Notify,
    shutdown_reason: Mutex<Option<String>>,
    disconnects: mpsc::UnboundedSender<TransportDisconnectedEvent>,
}

impl PayloadSender {
    /// Create a sender reporting disconnects on `disconnects`.
    pub fn new(disconnects: mpsc::UnboundedSender<TransportDisconnectedEvent>) -> Self {
        Self {
            transport: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
            cancellation: Mutex::new(Cancellation::default()),
            shutdown: Notify::new(),
            shutdown_reason: Mutex::new(None),
            disconnects,
        }
    }

    /// Start writing to `transport`.
    pub async fn connect(&self, transport: Box<dyn TransportSender>) {
        *self.transport.lock().await = Some(transport);
        *self.shutdown_reason() = None;
        self.connected.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn cancellation(&self) -> MutexGuard<'_, Cancellation> {
        self.cancellation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn shutdown_reason(&self) -> MutexGuard<'_, Option<String>> {
        self.shutdown_reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send one logical payload.
    ///
    /// `header` supplies the type and ID; its length and end flag are
    /// rewritten per frame. An empty payload is sent as a single
    /// zero-length frame. A transport failure disconnects the sender.
    pub async fn send_payload(&self, header: Header, payload: Bytes) -> Result<()> {
        let cancellable = header.payload_type == PayloadType::Stream;
        if cancellable {
            self.cancellation().in_flight.insert(header.id);
        }

        let result = self.send_frames(header, payload, cancellable).await;

        if cancellable {
            let mut cancellation = self.cancellation();
            cancellation.in_flight.remove(&header.id);
            cancellation.cancelled.remove(&header.id);
        }

        result
    }

    async fn send_frames(&self, header: Header, payload: Bytes, cancellable: bool) -> Result<()> {
        if payload.is_empty() {
            let header = Header::new(header.payload_type, 0, header.id, header.end);
            return self.write_frame(Frame::empty(header)).await;
        }

        let total = payload.len();
        let mut offset = 0;

        while offset < total {
            if cancellable && self.is_cancelled(&header.id) {
                tracing::debug!("Stream {} cancelled by peer after {} bytes", header.id, offset);
                // Close the payload so the peer drops its assembler.
                let last = Header::new(header.payload_type, 0, header.id, true);
                return self.write_frame(Frame::empty(last)).await;
            }

            let len = MAX_PAYLOAD_LENGTH.min(total - offset);
            let chunk = payload.slice(offset..offset + len);
            offset += len;

            let chunk_header = Header::new(
                header.payload_type,
                len as u32,
                header.id,
                header.end && offset == total,
            );
            self.write_frame(Frame::new(chunk_header, chunk)).await?;
        }

        Ok(())
    }

    /// Write one frame, giving up as soon as the sender is disconnected.
    ///
    /// A write stuck on a peer that stopped reading holds the transport lock;
    /// abandoning it on shutdown lets [`disconnect`](Self::disconnect) take the lock.
    async fn write_frame(&self, frame: Frame) -> Result<()> {
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        if !self.is_connected() {
            return Err(self.closed_error());
        }

        let result = tokio::select! {
            result = self.send_locked(frame.encode()) => result,
            _ = shutdown.as_mut() => return Err(self.closed_error()),
        };

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("Send failed, disconnecting: {}", reason);
                self.disconnect(Some(TransportDisconnectedEvent::new(reason.clone())))
                    .await;
                Err(StreamingError::Disconnected(reason))
            }
        }
    }

    async fn send_locked(&self, buffer: Bytes) -> Result<usize> {
        let mut transport = self.transport.lock().await;
        match transport.as_mut() {
            Some(transport) => transport.send(buffer).await,
            None => Err(StreamingError::NotConnected),
        }
    }

    fn closed_error(&self) -> StreamingError {
        match self.shutdown_reason().clone() {
            Some(reason) => StreamingError::Disconnected(reason),
            None => StreamingError::NotConnected,
        }
    }

    fn is_cancelled(&self, id: &Uuid) -> bool {
        self.cancellation().cancelled.contains(id)
    }

    /// Stop sending the stream payload `id` after the current frame.
    pub fn cancel_stream(&self, id: Uuid) {
        let mut cancellation = self.cancellation();
        if cancellation.in_flight.contains(&id) {
            cancellation.cancelled.insert(id);
        }
    }

    /// Stop every stream payload currently being sent.
    pub fn cancel_all(&self) {
        let mut cancellation = self.cancellation();
        let in_flight: Vec<Uuid> = cancellation.in_flight.iter().copied().collect();
        cancellation.cancelled.extend(in_flight);
    }

    /// Close the transport.
    ///
    /// Writes in progress fail with the disconnect reason. The disconnect
    /// event is emitted once, by whichever call finds the transport still
    /// attached.
    pub async fn disconnect(&self, event: Option<TransportDisconnectedEvent>) {
        let event = event.unwrap_or_default();
        {
            let mut reason = self.shutdown_reason();
            if reason.is_none() {
                *reason = Some(event.to_string());
            }
        }
        self.connected.store(false, Ordering::Release);
        self.shutdown.notify_waiters();

        let transport = self.transport.lock().await.take();

        if let Some(mut transport) = transport {
            let _ = self.disconnects.send(event);
            if tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await.is_err() {
                tracing::debug!("Transport close timed out");
            }
        }
    }
}
