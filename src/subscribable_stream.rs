//! Growable byte buffer backing every assembled payload.
//!
//! Written chunks are queued as `Bytes` (no contiguous re-allocation on
//! append). Readers either consume synchronously with [`SubscribableStream::read`]
//! or wait for data with [`SubscribableStream::read_chunk`] /
//! [`SubscribableStream::read_to_end`]. A subscriber callback sees every
//! chunk as it is written, which lets consumers process a long attachment
//! before it has fully arrived.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;

type Subscriber = Arc<dyn Fn(&Bytes) + Send + Sync>;

#[derive(Default)]
struct State {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    written: usize,
    ended: bool,
    subscriber: Option<Subscriber>,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// Cloneable handle to a shared chunk queue.
#[derive(Clone)]
pub struct SubscribableStream {
    shared: Arc<Shared>,
}

impl SubscribableStream {
    /// Create an empty, open stream.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Create an already-ended stream holding `data`.
    pub fn from_bytes(data: Bytes) -> Self {
        let stream = Self::new();
        stream.write(data);
        stream.end();
        stream
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk. Writes after [`end`](Self::end) are dropped.
    pub fn write(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }

        let subscriber = {
            let mut state = self.state();
            if state.ended {
                return;
            }
            state.buffered += chunk.len();
            state.written += chunk.len();
            state.chunks.push_back(chunk.clone());
            state.subscriber.clone()
        };

        if let Some(subscriber) = subscriber {
            subscriber(&chunk);
        }
        self.shared.notify.notify_waiters();
    }

    /// Mark the stream complete; pending readers drain what is left.
    pub fn end(&self) {
        self.state().ended = true;
        self.shared.notify.notify_waiters();
    }

    /// Whether [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.state().ended
    }

    /// Bytes buffered and not yet read.
    pub fn len(&self) -> usize {
        self.state().buffered
    }

    /// Check if no unread bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes written over the stream's lifetime, read or not.
    pub fn total_written(&self) -> usize {
        self.state().written
    }

    /// Register a callback invoked with every chunk written from now on.
    ///
    /// Replaces any previous subscriber.
    pub fn subscribe<F>(&self, on_data: F)
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.state().subscriber = Some(Arc::new(on_data));
    }

    /// Consume up to `max` buffered bytes without waiting.
    ///
    /// Returns an empty buffer when nothing is buffered.
    pub fn read(&self, max: usize) -> Bytes {
        let mut state = self.state();
        take(&mut state, max)
    }

    /// Wait for and consume up to `max` bytes.
    ///
    /// Returns `None` once the stream has ended and is drained.
    pub async fn read_chunk(&self, max: usize) -> Option<Bytes> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.buffered > 0 {
                    return Some(take(&mut state, max));
                }
                if state.ended {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Wait for the stream to end and consume everything it carried.
    pub async fn read_to_end(&self) -> Bytes {
        let mut parts = Vec::new();
        while let Some(chunk) = self.read_chunk(usize::MAX).await {
            parts.push(chunk);
        }

        match parts.len() {
            0 => Bytes::new(),
            1 => parts.pop().unwrap_or_default(),
            _ => {
                let mut out = BytesMut::with_capacity(parts.iter().map(Bytes::len).sum());
                for part in &parts {
                    out.extend_from_slice(part);
                }
                out.freeze()
            }
        }
    }
}

fn take(state: &mut State, max: usize) -> Bytes {
    let wanted = max.min(state.buffered);
    if wanted == 0 {
        return Bytes::new();
    }

    let front_len = state.chunks.front().map_or(0, Bytes::len);
    let out = if front_len == wanted {
        state.chunks.pop_front().unwrap_or_default()
    } else if front_len > wanted {
        state
            .chunks
            .front_mut()
            .map(|front| front.split_to(wanted))
            .unwrap_or_default()
    } else {
        let mut out = BytesMut::with_capacity(wanted);
        while out.len() < wanted {
            let Some(front) = state.chunks.front_mut() else {
                break;
            };
            let needed = wanted - out.len();
            if front.len() <= needed {
                out.extend_from_slice(front);
                state.chunks.pop_front();
            } else {
                out.extend_from_slice(&front.split_to(needed));
            }
        }
        out.freeze()
    };

    state.buffered -= out.len();
    out
}

impl Default for SubscribableStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscribableStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("SubscribableStream")
            .field("buffered", &state.buffered)
            .field("written", &state.written)
            .field("ended", &state.ended)
            .finish()
    }
}
