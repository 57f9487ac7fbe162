//! Transport module - raw byte I/O underneath the payload layer.
//!
//! A connection is a pair of halves:
//! - [`TransportSender`] writes whole buffers
//! - [`TransportReceiver`] hands back up to `count` bytes per call
//!
//! Implementations:
//! - [`StreamSender`] / [`StreamReceiver`] over any tokio `AsyncWrite` / `AsyncRead`
//! - Unix Domain Sockets / Windows Named Pipes ([`PipeListener`], [`connect_pipe`])
//! - WebSocket binary messages ([`WebSocketSender`], [`WebSocketReceiver`])

mod pipe;
mod stream;
mod websocket;

use bytes::Bytes;

use crate::error::Result;
use crate::handler::BoxFuture;

pub use pipe::{connect_pipe, pipe_path, PipeListener, PipeStream, INCOMING_SUFFIX, OUTGOING_SUFFIX};
pub use stream::{split_stream, StreamReceiver, StreamSender};
pub use websocket::{split_websocket, WebSocketReceiver, WebSocketSender};

/// Write half of a duplex connection.
pub trait TransportSender: Send + 'static {
    /// Write the whole buffer, returning the number of bytes written.
    fn send(&mut self, buffer: Bytes) -> BoxFuture<'_, Result<usize>>;

    /// Whether the underlying socket is still usable.
    fn is_connected(&self) -> bool;

    /// Close the write half. Idempotent.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Read half of a duplex connection.
pub trait TransportReceiver: Send + 'static {
    /// Read at most `count` bytes, waiting until at least one is available.
    ///
    /// Fails with [`StreamingError::Disconnected`](crate::StreamingError::Disconnected)
    /// once the peer has gone away.
    fn receive(&mut self, count: usize) -> BoxFuture<'_, Result<Bytes>>;

    /// Whether the underlying socket is still usable.
    fn is_connected(&self) -> bool;

    /// Close the read half. Idempotent.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

impl<T: TransportSender + ?Sized> TransportSender for Box<T> {
    fn send(&mut self, buffer: Bytes) -> BoxFuture<'_, Result<usize>> {
        (**self).send(buffer)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        (**self).close()
    }
}

impl<T: TransportReceiver + ?Sized> TransportReceiver for Box<T> {
    fn receive(&mut self, count: usize) -> BoxFuture<'_, Result<Bytes>> {
        (**self).receive(count)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        (**self).close()
    }
}
