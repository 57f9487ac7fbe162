//! WebSocket transport (tokio-tungstenite).
//!
//! Every `send` becomes one binary WebSocket message. Incoming messages are
//! buffered and handed out `count` bytes at a time, so frame boundaries on
//! the WebSocket never need to line up with protocol frames.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use super::{TransportReceiver, TransportSender};
use crate::error::{Result, StreamingError};
use crate::handler::BoxFuture;

/// Write half of a WebSocket connection.
pub struct WebSocketSender<S> {
    sink: Option<SplitSink<WebSocketStream<S>, WsMessage>>,
}

/// Read half of a WebSocket connection.
pub struct WebSocketReceiver<S> {
    stream: Option<SplitStream<WebSocketStream<S>>>,
    pending: BytesMut,
}

/// Split an established WebSocket into transport halves.
pub fn split_websocket<S>(ws: WebSocketStream<S>) -> (WebSocketSender<S>, WebSocketReceiver<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    (
        WebSocketSender { sink: Some(sink) },
        WebSocketReceiver {
            stream: Some(stream),
            pending: BytesMut::new(),
        },
    )
}

impl<S> TransportSender for WebSocketSender<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn send(&mut self, buffer: Bytes) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let sink = self.sink.as_mut().ok_or(StreamingError::NotConnected)?;
            let len = buffer.len();

            if let Err(e) = sink.send(WsMessage::Binary(buffer.to_vec())).await {
                self.sink = None;
                return Err(e.into());
            }

            Ok(len)
        })
    }

    fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut sink) = self.sink.take() {
                let _ = sink.close().await;
            }
        })
    }
}

impl<S> TransportReceiver for WebSocketReceiver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn receive(&mut self, count: usize) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            while self.pending.is_empty() {
                let stream = self.stream.as_mut().ok_or(StreamingError::NotConnected)?;

                match stream.next().await {
                    Some(Ok(WsMessage::Binary(data))) => self.pending.extend_from_slice(&data),
                    Some(Ok(WsMessage::Text(text))) => self.pending.extend_from_slice(text.as_bytes()),
                    Some(Ok(WsMessage::Close(_))) | None => {
                        self.stream = None;
                        return Err(StreamingError::Disconnected(
                            "WebSocket closed by peer".to_string(),
                        ));
                    }
                    // Pings are answered by tungstenite itself
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        self.stream = None;
                        return Err(e.into());
                    }
                }
            }

            let n = count.min(self.pending.len());
            Ok(self.pending.split_to(n).freeze())
        })
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stream = None;
            self.pending.clear();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    #[tokio::test]
    async fn test_send_is_one_binary_message() {
        let (client, mut server) = pair().await;
        let (mut sender, _receiver) = split_websocket(client);

        let sent = sender.send(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(sent, 5);

        match server.next().await {
            Some(Ok(WsMessage::Binary(data))) => assert_eq!(data, b"hello"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_splits_messages() {
        let (client, mut server) = pair().await;
        let (_sender, mut receiver) = split_websocket(client);

        server
            .send(WsMessage::Binary(b"0123456789".to_vec()))
            .await
            .unwrap();

        let first = receiver.receive(4).await.unwrap();
        assert_eq!(&first[..], b"0123");
        let rest = receiver.receive(64).await.unwrap();
        assert_eq!(&rest[..], b"456789");
    }

    #[tokio::test]
    async fn test_receive_after_close() {
        let (client, mut server) = pair().await;
        let (_sender, mut receiver) = split_websocket(client);

        server.close(None).await.unwrap();

        let err = receiver.receive(4).await.unwrap_err();
        assert!(matches!(err, StreamingError::Disconnected(_)));
        assert!(!receiver.is_connected());
    }
}
