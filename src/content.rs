//! Body content carried alongside requests and responses.
//!
//! Outbound bodies are [`HttpContent`] values wrapped in an
//! [`HttpContentStream`] (which assigns the stream ID). Inbound bodies arrive
//! as [`ContentStream`]s backed by a live assembler, so they can be read while
//! still arriving or cancelled.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::assemblers::PayloadAssembler;
use crate::error::{Result, StreamingError};
use crate::subscribable_stream::SubscribableStream;

/// Content type used for JSON and string bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content type used for plain text bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Headers describing a content body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpContentHeaders {
    pub content_type: Option<String>,
    pub content_length: Option<usize>,
}

/// A fully buffered outbound body.
#[derive(Debug, Clone)]
pub struct HttpContent {
    pub headers: HttpContentHeaders,
    body: Bytes,
}

impl HttpContent {
    /// Create content from raw bytes; the length header is filled in.
    pub fn new(content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            headers: HttpContentHeaders {
                content_type: content_type.map(str::to_string),
                content_length: Some(body.len()),
            },
            body,
        }
    }

    /// Plain UTF-8 text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Some(TEXT_CONTENT_TYPE), text.into())
    }

    /// Serialize `value` as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(Some(JSON_CONTENT_TYPE), body))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.content_type.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Outbound content paired with the ID of the stream payload carrying it.
#[derive(Debug, Clone)]
pub struct HttpContentStream {
    pub id: Uuid,
    pub content: HttpContent,
}

impl HttpContentStream {
    /// Wrap content under a fresh stream ID.
    pub fn new(content: HttpContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
        }
    }
}

/// An inbound body referenced from a request or response envelope.
///
/// Bytes flow into it as the matching `stream` payload arrives.
#[derive(Clone)]
pub struct ContentStream {
    id: Uuid,
    content_type: Option<String>,
    length: Option<usize>,
    assembler: Arc<PayloadAssembler>,
}

impl ContentStream {
    pub(crate) fn new(assembler: Arc<PayloadAssembler>) -> Self {
        Self {
            id: assembler.id(),
            content_type: assembler.content_type(),
            length: assembler.content_length(),
            assembler,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Content type declared by the envelope, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Length declared by the envelope, if any.
    pub fn length(&self) -> Option<usize> {
        self.length
    }

    /// The buffer the body is being assembled into.
    pub fn get_stream(&self) -> SubscribableStream {
        self.assembler.stream()
    }

    /// Stop receiving this body.
    ///
    /// If the body has not fully arrived the peer is asked to stop sending it.
    pub fn cancel(&self) {
        self.assembler.close();
    }

    /// Wait for the whole body.
    pub async fn read_as_bytes(&self) -> Bytes {
        self.assembler.stream().read_to_end().await
    }

    /// Wait for the whole body and decode it as UTF-8.
    pub async fn read_as_string(&self) -> Result<String> {
        let bytes = self.read_as_bytes().await;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StreamingError::Protocol(format!("Body of stream {} is not UTF-8: {}", self.id, e)))
    }

    /// Wait for the whole body and deserialize it as JSON.
    pub async fn read_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.read_as_bytes().await;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("length", &self.length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_length_from_body() {
        let content = HttpContent::new(Some("application/octet-stream"), vec![1u8, 2, 3]);

        assert_eq!(content.headers.content_length, Some(3));
        assert_eq!(content.content_type(), Some("application/octet-stream"));
        assert_eq!(content.len(), 3);
    }

    #[test]
    fn test_json_content() {
        let content = HttpContent::json(&serde_json::json!({ "a": 1 })).unwrap();

        assert_eq!(content.content_type(), Some(JSON_CONTENT_TYPE));
        assert_eq!(&content.body()[..], br#"{"a":1}"#);
    }

    #[test]
    fn test_content_streams_get_distinct_ids() {
        let a = HttpContentStream::new(HttpContent::text("a"));
        let b = HttpContentStream::new(HttpContent::text("b"));

        assert_ne!(a.id, b.id);
        assert_eq!(a.content.content_type(), Some(TEXT_CONTENT_TYPE));
    }
}
