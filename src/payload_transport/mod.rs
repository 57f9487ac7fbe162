//! Payload transport - frames logical payloads onto a byte transport.
//!
//! - [`PayloadSender`] chunks payloads into frames of at most
//!   [`MAX_PAYLOAD_LENGTH`](crate::protocol::MAX_PAYLOAD_LENGTH) bytes
//! - [`PayloadReceiver`] runs the receive loop and feeds a [`ReceiveSink`]
//!
//! Either side reports a dead connection once, as a
//! [`TransportDisconnectedEvent`] on the channel it was created with.

mod receiver;
mod sender;

use std::fmt;

pub use receiver::{PayloadReceiver, ReceiveSink};
pub use sender::PayloadSender;

/// Why a connection went away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportDisconnectedEvent {
    pub reason: String,
}

impl TransportDisconnectedEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TransportDisconnectedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            f.write_str("Transport disconnected")
        } else {
            f.write_str(&self.reason)
        }
    }
}
