//! Outbound and inbound request types.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::content::{ContentStream, HttpContent, HttpContentStream, JSON_CONTENT_TYPE};
use crate::error::{Result, StreamingError};

/// Common request verbs.
pub mod verb {
    pub const GET: &str = "GET";
    pub const POST: &str = "POST";
    pub const PUT: &str = "PUT";
    pub const DELETE: &str = "DELETE";
    pub const PATCH: &str = "PATCH";
}

/// A request to send to the peer.
///
/// Each attached stream travels as its own `stream` payload after the
/// request envelope.
#[derive(Debug, Clone, Default)]
pub struct StreamingRequest {
    pub verb: String,
    pub path: String,
    pub streams: Vec<HttpContentStream>,
}

impl StreamingRequest {
    /// Create a request without a body.
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    /// Create a request, optionally attaching `body` as its first stream.
    pub fn create(verb: impl Into<String>, path: impl Into<String>, body: Option<HttpContent>) -> Self {
        let mut request = Self::new(verb, path);
        if let Some(body) = body {
            request.add_stream(body);
        }
        request
    }

    /// Attach content under a fresh stream ID and return that ID.
    pub fn add_stream(&mut self, content: HttpContent) -> Uuid {
        let stream = HttpContentStream::new(content);
        let id = stream.id;
        self.streams.push(stream);
        id
    }

    /// Attach a string body, labelled as JSON.
    pub fn set_body(&mut self, body: impl Into<String>) -> Uuid {
        self.add_stream(HttpContent::new(Some(JSON_CONTENT_TYPE), body.into()))
    }

    /// Serialize `body` as JSON and attach it.
    pub fn set_json_body<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<Uuid> {
        Ok(self.add_stream(HttpContent::json(body)?))
    }
}

/// A fully assembled request received from the peer.
#[derive(Debug, Clone, Default)]
pub struct ReceiveRequest {
    pub verb: String,
    pub path: String,
    pub streams: Vec<ContentStream>,
}

impl ReceiveRequest {
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
                "{} {} has no body",
                self.verb, self.path
            ))),
        }
    }
}
