//! Routing of received frames to assemblers.
//!
//! Request and response envelopes are assembled here; content streams are
//! delegated to the [`StreamManager`]. When an envelope's final frame arrives
//! its JSON is parsed, the content streams it references are looked up (or
//! created) and the result is emitted as a [`PayloadEvent`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::envelope::{RequestPayload, ResponsePayload, StreamDescription};
use super::{PayloadEvent, StreamManager};
use crate::assemblers::PayloadAssembler;
use crate::content::ContentStream;
use crate::error::{Result, StreamingError};
use crate::payload_transport::ReceiveSink;
use crate::protocol::{Header, PayloadType};
use crate::request::ReceiveRequest;
use crate::response::ReceiveResponse;
use crate::subscribable_stream::SubscribableStream;

/// Owns envelope assemblers for one connection.
pub struct PayloadAssemblerManager {
    stream_manager: Arc<StreamManager>,
    active: Mutex<HashMap<Uuid, Arc<PayloadAssembler>>>,
    events: mpsc::UnboundedSender<PayloadEvent>,
}

impl PayloadAssemblerManager {
    pub fn new(stream_manager: Arc<StreamManager>, events: mpsc::UnboundedSender<PayloadEvent>) -> Self {
        Self {
            stream_manager,
            active: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<PayloadAssembler>>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stream_manager(&self) -> &Arc<StreamManager> {
        &self.stream_manager
    }

    /// Number of envelopes currently being assembled.
    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    /// End every envelope and content stream still being assembled.
    pub fn close_all(&self) {
        let envelopes: Vec<Arc<PayloadAssembler>> = self.active().drain().map(|(_, assembler)| assembler).collect();
        for assembler in envelopes {
            assembler.stream().end();
        }
        self.stream_manager.close_all();
    }

    fn content_streams(&self, descriptions: Vec<StreamDescription>) -> Vec<ContentStream> {
        descriptions
            .into_iter()
            .map(|description| {
                let assembler = self.stream_manager.get_payload_assembler(description.id);
                assembler.set_content(description.content_type, description.length);
                ContentStream::new(assembler)
            })
            .collect()
    }

    fn process_envelope(&self, assembler: &PayloadAssembler) -> Result<PayloadEvent> {
        let body = assembler.stream().read(usize::MAX);

        match assembler.payload_type() {
            PayloadType::Request => {
                let payload: RequestPayload = serde_json::from_slice(&body)?;
                let request = ReceiveRequest {
                    verb: payload.verb,
                    path: payload.path,
                    streams: self.content_streams(payload.streams),
                };
                Ok(PayloadEvent::Request(assembler.id(), request))
            }
            PayloadType::Response => {
                let payload: ResponsePayload = serde_json::from_slice(&body)?;
                let response = ReceiveResponse {
                    status_code: payload.status_code,
                    streams: self.content_streams(payload.streams),
                };
                Ok(PayloadEvent::Response(assembler.id(), response))
            }
            other => Err(StreamingError::Protocol(format!(
                "Payload type {} is not an envelope",
                other
            ))),
        }
    }
}

impl ReceiveSink for PayloadAssemblerManager {
    fn get_payload_stream(&self, header: &Header) -> Option<SubscribableStream> {
        match header.payload_type {
            PayloadType::Stream => self.stream_manager.get_payload_stream(header),
            PayloadType::Request | PayloadType::Response => {
                let mut active = self.active();
                let assembler = active.entry(header.id).or_insert_with(|| {
                    Arc::new(PayloadAssembler::new(
                        Arc::downgrade(&self.stream_manager),
                        header.id,
                        header.payload_type,
                    ))
                });
                Some(assembler.stream())
            }
            PayloadType::CancelAll | PayloadType::CancelStream => None,
        }
    }

    fn on_receive(&self, header: &Header) {
        match header.payload_type {
            PayloadType::Stream => self.stream_manager.on_receive(header),
            PayloadType::Request | PayloadType::Response => {
                if !header.end {
                    return;
                }

                let Some(assembler) = self.active().remove(&header.id) else {
                    return;
                };
                assembler.on_receive(header);

                match self.process_envelope(&assembler) {
                    Ok(event) => {
                        let _ = self.events.send(event);
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed {} envelope {}: {}", header.payload_type, header.id, e);
                    }
                }
            }
            PayloadType::CancelAll | PayloadType::CancelStream => self.on_control(header),
        }
    }

    fn on_control(&self, header: &Header) {
        let _ = self.events.send(PayloadEvent::PeerCancel(*header));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn manager() -> (PayloadAssemblerManager, mpsc::UnboundedReceiver<PayloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let streams = StreamManager::new(tx.clone());
        (PayloadAssemblerManager::new(streams, tx), rx)
    }

    fn feed(manager: &PayloadAssemblerManager, header: Header, body: &[u8]) {
        let stream = manager.get_payload_stream(&header).unwrap();
        stream.write(Bytes::copy_from_slice(body));
        manager.on_receive(&header);
    }

    #[tokio::test]
    async fn test_request_envelope_with_stream() {
        let (manager, mut rx) = manager();
        let request_id = Uuid::new_v4();
        let stream_id = Uuid::new_v4();

        let envelope = format!(
            r#"{{"verb":"POST","path":"/api/messages","streams":[{{"id":"{}","contentType":"text/plain","length":5}}]}}"#,
            stream_id
        );
        feed(&manager, Header::new(PayloadType::Request, envelope.len() as u32, request_id, true), envelope.as_bytes());
        feed(&manager, Header::new(PayloadType::Stream, 5, stream_id, true), b"hello");

        let Some(PayloadEvent::Request(id, request)) = rx.recv().await else {
            panic!("expected a request event");
        };
        assert_eq!(id, request_id);
        assert_eq!(request.verb, "POST");
        assert_eq!(request.streams.len(), 1);
        assert_eq!(request.streams[0].content_type(), Some("text/plain"));
        assert_eq!(request.streams[0].length(), Some(5));
        assert_eq!(request.read_body_as_string().await.unwrap(), "hello");

        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.stream_manager().active_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_frame_envelope() {
        let (manager, mut rx) = manager();
        let id = Uuid::new_v4();

        feed(&manager, Header::new(PayloadType::Response, 8, id, false), br#"{"status"#);
        assert_eq!(manager.active_count(), 1);
        feed(&manager, Header::new(PayloadType::Response, 10, id, true), br#"Code":204}"#);

        let Some(PayloadEvent::Response(_, response)) = rx.recv().await else {
            panic!("expected a response event");
        };
        assert_eq!(response.status_code, 204);
        assert!(response.streams.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_dropped() {
        let (manager, mut rx) = manager();
        let id = Uuid::new_v4();

        feed(&manager, Header::new(PayloadType::Request, 3, id, true), b"{{{");

        assert!(rx.try_recv().is_err());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_control_frames_are_forwarded() {
        let (manager, mut rx) = manager();
        let header = Header::new(PayloadType::CancelAll, 0, Uuid::new_v4(), true);

        assert!(manager.get_payload_stream(&header).is_none());
        manager.on_control(&header);

        assert!(matches!(rx.try_recv(), Ok(PayloadEvent::PeerCancel(h)) if h == header));
    }

    #[tokio::test]
    async fn test_close_all_ends_pending_bodies() {
        let (manager, mut rx) = manager();
        let stream_id = Uuid::new_v4();
        let envelope = format!(r#"{{"statusCode":200,"streams":[{{"id":"{}","length":1000}}]}}"#, stream_id);
        feed(&manager, Header::new(PayloadType::Response, envelope.len() as u32, Uuid::new_v4(), true), envelope.as_bytes());
        feed(&manager, Header::new(PayloadType::Stream, 10, stream_id, false), b"0123456789");
        feed(&manager, Header::new(PayloadType::Request, 4, Uuid::new_v4(), false), b"{\"ve");

        let Some(PayloadEvent::Response(_, response)) = rx.recv().await else {
            panic!("expected a response event");
        };

        manager.close_all();

        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.stream_manager().active_count(), 0);
        let body = tokio::time::timeout(std::time::Duration::from_secs(1), response.read_body_as_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, "0123456789");
    }
}
