//! Assemblers for inbound content streams.
//!
//! A stream assembler can exist before anything is known about it: frames
//! may create it, or an envelope's `streams` list may create it first and
//! fill in the content type and length.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::PayloadEvent;
use crate::assemblers::PayloadAssembler;
use crate::protocol::{Header, PayloadType};
use crate::subscribable_stream::SubscribableStream;

#[derive(Default)]
struct Streams {
    active: HashMap<Uuid, Arc<PayloadAssembler>>,
    /// Streams closed locally whose remaining frames are still arriving.
    cancelled: HashSet<Uuid>,
}

/// Tracks one assembler per in-flight content stream.
pub struct StreamManager {
    streams: Mutex<Streams>,
    events: mpsc::UnboundedSender<PayloadEvent>,
    this: Weak<StreamManager>,
}

impl StreamManager {
    /// Create a manager reporting local cancellations on `events`.
    pub fn new(events: mpsc::UnboundedSender<PayloadEvent>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            streams: Mutex::new(Streams::default()),
            events,
            this: this.clone(),
        })
    }

    fn streams(&self) -> MutexGuard<'_, Streams> {
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_or_create(&self, streams: &mut Streams, id: Uuid) -> Arc<PayloadAssembler> {
        streams
            .active
            .entry(id)
            .or_insert_with(|| Arc::new(PayloadAssembler::new(self.this.clone(), id, PayloadType::Stream)))
            .clone()
    }

    /// Get the assembler for `id`, creating it if needed.
    pub fn get_payload_assembler(&self, id: Uuid) -> Arc<PayloadAssembler> {
        let mut streams = self.streams();
        self.get_or_create(&mut streams, id)
    }

    /// Buffer for an arriving stream frame; `None` if the stream was cancelled here.
    pub fn get_payload_stream(&self, header: &Header) -> Option<SubscribableStream> {
        let mut streams = self.streams();

        if streams.cancelled.contains(&header.id) {
            if header.end {
                streams.cancelled.remove(&header.id);
            }
            return None;
        }

        Some(self.get_or_create(&mut streams, header.id).stream())
    }

    /// Bytes for `header` are in the stream. The final frame retires the assembler.
    pub fn on_receive(&self, header: &Header) {
        let assembler = {
            let mut streams = self.streams();
            if header.end {
                streams.active.remove(&header.id)
            } else {
                streams.active.get(&header.id).cloned()
            }
        };

        if let Some(assembler) = assembler {
            assembler.on_receive(header);
        }
    }

    /// Retire the assembler for `id`.
    ///
    /// If its data has not all arrived, the peer is asked to stop sending
    /// and any frames still in flight are dropped on arrival.
    pub fn close_stream(&self, id: Uuid) {
        // Removal and tombstone share one guard so a frame arriving in
        // between cannot recreate the assembler.
        let (assembler, incomplete) = {
            let mut streams = self.streams();
            let Some(assembler) = streams.active.remove(&id) else {
                return;
            };
            let incomplete = !assembler.is_complete();
            if incomplete && !assembler.is_end() {
                streams.cancelled.insert(id);
            }
            (assembler, incomplete)
        };

        if incomplete {
            tracing::debug!("Cancelling inbound stream {}", id);
            let _ = self.events.send(PayloadEvent::CancelStream(id));
        }

        assembler.stream().end();
    }

    /// End every active stream and forget all tombstones.
    ///
    /// Called when the connection goes away so readers see end-of-stream
    /// instead of waiting for frames that will never come.
    pub fn close_all(&self) {
        let active: Vec<Arc<PayloadAssembler>> = {
            let mut streams = self.streams();
            streams.cancelled.clear();
            streams.active.drain().map(|(_, assembler)| assembler).collect()
        };

        for assembler in active {
            assembler.stream().end();
        }
    }

    /// Whether an assembler is active for `id`.
    pub fn is_active(&self, id: Uuid) -> bool {
        self.streams().active.contains_key(&id)
    }

    /// Number of active stream assemblers.
    pub fn active_count(&self) -> usize {
        self.streams().active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn manager() -> (Arc<StreamManager>, mpsc::UnboundedReceiver<PayloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StreamManager::new(tx), rx)
    }

    #[test]
    fn test_get_payload_assembler_reuses_existing() {
        let (manager, _rx) = manager();
        let id = Uuid::new_v4();

        let first = manager.get_payload_assembler(id);
        let second = manager.get_payload_assembler(id);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_end_frame_removes_assembler() {
        let (manager, _rx) = manager();
        let id = Uuid::new_v4();
        let header = Header::new(PayloadType::Stream, 3, id, true);

        let stream = manager.get_payload_stream(&header).unwrap();
        stream.write(Bytes::from_static(b"abc"));
        manager.on_receive(&header);

        assert!(!manager.is_active(id));
        assert!(stream.is_ended());
    }

    #[test]
    fn test_close_incomplete_stream_cancels_once() {
        let (manager, mut rx) = manager();
        let id = Uuid::new_v4();
        let assembler = manager.get_payload_assembler(id);
        assembler.set_content(None, Some(100));

        let header = Header::new(PayloadType::Stream, 10, id, false);
        manager.get_payload_stream(&header).unwrap().write(Bytes::from(vec![0u8; 10]));
        manager.on_receive(&header);

        assembler.close();
        assembler.close();

        assert!(matches!(rx.try_recv(), Ok(PayloadEvent::CancelStream(c)) if c == id));
        assert!(rx.try_recv().is_err());
        assert!(assembler.stream().is_ended());
    }

    #[test]
    fn test_frames_after_cancel_are_dropped() {
        let (manager, _rx) = manager();
        let id = Uuid::new_v4();
        manager.get_payload_assembler(id);
        manager.close_stream(id);

        let more = Header::new(PayloadType::Stream, 10, id, false);
        assert!(manager.get_payload_stream(&more).is_none());
        assert!(!manager.is_active(id));

        let last = Header::new(PayloadType::Stream, 0, id, true);
        assert!(manager.get_payload_stream(&last).is_none());

        // The end frame clears the tombstone.
        assert!(manager.get_payload_stream(&more).is_some());
    }

    #[test]
    fn test_close_complete_stream_sends_nothing() {
        let (manager, mut rx) = manager();
        let id = Uuid::new_v4();
        let assembler = manager.get_payload_assembler(id);

        manager.on_receive(&Header::new(PayloadType::Stream, 0, id, false));
        assembler.on_receive(&Header::new(PayloadType::Stream, 0, id, true));
        manager.close_stream(id);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_all_ends_partial_streams() {
        let (manager, mut rx) = manager();
        let partial = manager.get_payload_assembler(Uuid::new_v4());
        partial.set_content(None, Some(1000));
        partial.stream().write(Bytes::from_static(b"0123456789"));
        let declared = manager.get_payload_assembler(Uuid::new_v4());

        let cancelled = Uuid::new_v4();
        manager.get_payload_assembler(cancelled);
        manager.close_stream(cancelled);
        let _ = rx.try_recv();

        manager.close_all();

        assert_eq!(manager.active_count(), 0);
        assert!(partial.stream().is_ended());
        assert!(declared.stream().is_ended());
        assert_eq!(&partial.stream().read(100)[..], b"0123456789");
        // Tombstones are gone too; no cancel is sent for the ended streams.
        let more = Header::new(PayloadType::Stream, 10, cancelled, false);
        assert!(manager.get_payload_stream(&more).is_some());
        assert!(rx.try_recv().is_err());
    }
}
