//! Per-ID reassembly state.

use std::fmt;
use std::sync::{Mutex, MutexGuard, Weak};

use uuid::Uuid;

use crate::payloads::StreamManager;
use crate::protocol::{Header, PayloadType};
use crate::subscribable_stream::SubscribableStream;

#[derive(Debug, Default)]
struct AssemblerState {
    content_type: Option<String>,
    content_length: Option<usize>,
    end: bool,
}

/// Collects the frames of one logical payload into a [`SubscribableStream`].
///
/// Content type and length are usually learned after creation, from the
/// `streams` list of the envelope that references this payload.
pub struct PayloadAssembler {
    id: Uuid,
    payload_type: PayloadType,
    stream: SubscribableStream,
    state: Mutex<AssemblerState>,
    manager: Weak<StreamManager>,
}

impl PayloadAssembler {
    pub(crate) fn new(manager: Weak<StreamManager>, id: Uuid, payload_type: PayloadType) -> Self {
        Self {
            id,
            payload_type,
            stream: SubscribableStream::new(),
            state: Mutex::new(AssemblerState::default()),
            manager,
        }
    }

    fn state(&self) -> MutexGuard<'_, AssemblerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn content_type(&self) -> Option<String> {
        self.state().content_type.clone()
    }

    pub fn content_length(&self) -> Option<usize> {
        self.state().content_length
    }

    /// Record the metadata an envelope declared for this payload.
    pub fn set_content(&self, content_type: Option<String>, content_length: Option<usize>) {
        let mut state = self.state();
        state.content_type = content_type;
        state.content_length = content_length;
    }

    /// Whether the final frame has been received.
    pub fn is_end(&self) -> bool {
        self.state().end
    }

    /// Whether every declared byte has arrived.
    pub fn is_complete(&self) -> bool {
        let state = self.state();
        let received_all = state
            .content_length
            .map_or(true, |length| self.stream.total_written() >= length);
        state.end && received_all
    }

    /// Handle to the buffer frames are written into.
    pub fn stream(&self) -> SubscribableStream {
        self.stream.clone()
    }

    /// Apply a received frame's header. The bytes are already in the stream.
    pub(crate) fn on_receive(&self, header: &Header) {
        if header.end {
            self.state().end = true;
            self.stream.end();
        }
    }

    /// Stop assembling. Asks the peer to stop sending if data is outstanding.
    pub fn close(&self) {
        match self.manager.upgrade() {
            Some(manager) => manager.close_stream(self.id),
            None => self.stream.end(),
        }
    }
}

impl fmt::Debug for PayloadAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadAssembler")
            .field("id", &self.id)
            .field("payload_type", &self.payload_type)
            .field("state", &*self.state())
            .finish()
    }
}
