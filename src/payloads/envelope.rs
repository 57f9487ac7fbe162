//! JSON envelopes carried by request and response payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::HttpContentStream;
use crate::request::StreamingRequest;
use crate::response::StreamingResponse;

/// Reference from an envelope to a separately sent stream payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescription {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl From<&HttpContentStream> for StreamDescription {
    fn from(stream: &HttpContentStream) -> Self {
        Self {
            id: stream.id,
            content_type: stream.content.headers.content_type.clone(),
            length: stream.content.headers.content_length,
        }
    }
}

/// Body of a `request` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub verb: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

impl From<&StreamingRequest> for RequestPayload {
    fn from(request: &StreamingRequest) -> Self {
        Self {
            verb: request.verb.clone(),
            path: request.path.clone(),
            streams: request.streams.iter().map(StreamDescription::from).collect(),
        }
    }
}

/// Body of a `response` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

impl From<&StreamingResponse> for ResponsePayload {
    fn from(response: &StreamingResponse) -> Self {
        Self {
            status_code: response.status_code,
            streams: response.streams.iter().map(StreamDescription::from).collect(),
        }
    }
}
