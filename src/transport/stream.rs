//! Transport halves over tokio byte streams.
//!
//! Used for named pipes, Unix sockets and in-memory `tokio::io::duplex` pairs.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{TransportReceiver, TransportSender};
use crate::error::{Result, StreamingError};
use crate::handler::BoxFuture;

/// Sender writing straight into an `AsyncWrite`.
pub struct StreamSender<W> {
    writer: Option<W>,
}

impl<W> StreamSender<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }
}

impl<W> TransportSender for StreamSender<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn send(&mut self, buffer: Bytes) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let writer = self.writer.as_mut().ok_or(StreamingError::NotConnected)?;

            if let Err(e) = write_all_flush(writer, &buffer).await {
                self.writer = None;
                return Err(e.into());
            }

            Ok(buffer.len())
        })
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut writer) = self.writer.take() {
                let _ = writer.shutdown().await;
            }
        })
    }
}

async fn write_all_flush<W: AsyncWrite + Unpin>(writer: &mut W, buffer: &[u8]) -> std::io::Result<()> {
    writer.write_all(buffer).await?;
    writer.flush().await
}

/// Receiver reading from an `AsyncRead`.
pub struct StreamReceiver<R> {
    reader: Option<R>,
}

impl<R> StreamReceiver<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R> TransportReceiver for StreamReceiver<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn receive(&mut self, count: usize) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            let reader = self.reader.as_mut().ok_or(StreamingError::NotConnected)?;

            let mut buf = vec![0u8; count];
            let n = match reader.read(&mut buf).await {
                Ok(0) if count > 0 => {
                    self.reader = None;
                    return Err(StreamingError::Disconnected(
                        "Connection closed by peer".to_string(),
                    ));
                }
                Ok(n) => n,
                Err(e) => {
                    self.reader = None;
                    return Err(e.into());
                }
            };

            buf.truncate(n);
            Ok(Bytes::from(buf))
        })
    }

    fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.reader = None;
        })
    }
}

/// Split a bidirectional byte stream into transport halves.
pub fn split_stream<S>(stream: S) -> (StreamSender<WriteHalf<S>>, StreamReceiver<ReadHalf<S>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (StreamSender::new(writer), StreamReceiver::new(reader))
}
