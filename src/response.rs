//! Outbound and inbound response types.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::content::{ContentStream, HttpContent, HttpContentStream};
use crate::error::{Result, StreamingError};

/// A response to send back for a received request.
#[derive(Debug, Clone)]
pub struct StreamingResponse {
    pub status_code: u16,
    pub streams: Vec<HttpContentStream>,
}

impl StreamingResponse {
    /// Create a response, optionally attaching `body` as its first stream.
    pub fn create(status_code: u16, body: Option<HttpContent>) -> Self {
        let mut response = Self {
            status_code,
            streams: Vec::new(),
        };
        if let Some(body) = body {
            response.add_stream(body);
        }
        response
    }

    /// 200 with no body.
    pub fn ok() -> Self {
        Self::create(200, None)
    }

    /// 404 with no body.
    pub fn not_found() -> Self {
        Self::create(404, None)
    }

    /// Attach content under a fresh stream ID and return that ID.
    pub fn add_stream(&mut self, content: HttpContent) -> Uuid {
        let stream = HttpContentStream::new(content);
        let id = stream.id;
        self.streams.push(stream);
        id
    }

    /// Serialize `body` as JSON and attach it.
    pub fn set_body<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<Uuid> {
        Ok(self.add_stream(HttpContent::json(body)?))
    }

    /// Attach a plain text body.
    pub fn set_text_body(&mut self, body: impl Into<String>) -> Uuid {
        self.add_stream(HttpContent::text(body))
    }
}

/// A fully assembled response received from the peer.
#[derive(Debug, Clone, Default)]
pub struct ReceiveResponse {
    pub status_code: u16,
    pub streams: Vec<ContentStream>,
}

impl ReceiveResponse {
    /// Read the first stream as a string; empty when there is no body.
    pub async fn read_body_as_string(&self) -> Result<String> {
        match self.streams.first() {
            Some(stream) => stream.read_as_string().await,
            None => Ok(String::new()),
        }
    }

    /// Deserialize the first stream as JSON.
    pub async fn read_body_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        match self.streams.first() {
            Some(stream) => stream.read_as_json().await,
            None => Err(StreamingError::Protocol(format!(
                "Response with status {} has no body",
                self.status_code
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE};

    #[test]
    fn test_set_body_serializes_json() {
        let mut response = StreamingResponse::ok();
        response.set_body("Hello World!").unwrap();

        let body = &response.streams[0].content;
        assert_eq!(body.content_type(), Some(JSON_CONTENT_TYPE));
        assert_eq!(&body.body()[..], b"\"Hello World!\"");
    }

    #[test]
    fn test_text_body() {
        let mut response = StreamingResponse::create(500, None);
        response.set_text_body("boom");

        assert_eq!(response.status_code, 500);
        assert_eq!(response.streams[0].content.content_type(), Some(TEXT_CONTENT_TYPE));
    }

    #[test]
    fn test_not_found_has_no_body() {
        let response = StreamingResponse::not_found();
        assert_eq!(response.status_code, 404);
        assert!(response.streams.is_empty());
    }
}
