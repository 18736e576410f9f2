//! HTTP response handling.
//!
//! The transport produces a [`Response<Body>`]; the terminal middleware of a
//! pipeline decodes it into a [`Response<Payload>`], the shape middlewares and
//! callers see.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::HeaderMap;

/// A streaming body: chunks of bytes arriving over time.
pub type StreamingBody = Pin<Box<dyn Stream<Item = crate::Result<Bytes>> + Send>>;

// ============================================================================
// Transport body
// ============================================================================

/// Raw response body as returned by a transport.
pub enum Body {
    /// Fully buffered body.
    Full(Bytes),
    /// Body still arriving from the network.
    Stream(StreamingBody),
}

impl Body {
    /// An empty, buffered body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Full(Bytes::new())
    }

    /// Returns `true` when the body is known to carry no bytes.
    ///
    /// A stream is never known to be empty before it is read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Full(bytes) if bytes.is_empty())
    }

    /// Buffer the whole body.
    ///
    /// # Errors
    ///
    /// Returns an error if reading any chunk fails.
    pub async fn collect(self) -> crate::Result<Bytes> {
        match self {
            Self::Full(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(collected))
            }
        }
    }

    /// Expose the body as a stream, wrapping a buffered body in a single chunk.
    #[must_use]
    pub fn into_stream(self) -> StreamingBody {
        match self {
            Self::Full(bytes) => Box::pin(futures_util::stream::once(async move {
                Ok::<_, crate::Error>(bytes)
            })),
            Self::Stream(stream) => stream,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Full(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Full(Bytes::from(text))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("Full").field(bytes).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ============================================================================
// Decoded payload
// ============================================================================

/// Response data extracted by the terminal middleware.
pub enum Payload {
    /// No body was expected or none was sent.
    Empty,
    /// Decoded JSON document.
    Json(serde_json::Value),
    /// Decoded text.
    Text(String),
    /// Raw bytes (`blob` and `arrayBuffer` response types).
    Binary(Bytes),
    /// Undecoded body channel (`stream` response type).
    Stream(StreamingBody),
}

impl Payload {
    /// Returns `true` for [`Payload::Empty`].
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// JSON document, if the payload was decoded as JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Text, if the payload was decoded as text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Bytes, if the payload was kept binary.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserialize the payload into `T`.
    ///
    /// JSON payloads are converted directly; text and binary payloads are
    /// parsed as JSON. An empty payload deserializes from `null`, which suits
    /// `Option<T>` and `()`.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the payload is a stream.
    pub fn json<T: serde::de::DeserializeOwned>(self) -> crate::Result<T> {
        match self {
            Self::Empty => from_value(serde_json::Value::Null),
            Self::Json(value) => from_value(value),
            Self::Text(text) => crate::from_json(text.as_bytes()),
            Self::Binary(bytes) => crate::from_json(&bytes),
            Self::Stream(_) => Err(crate::Error::json_deserialization(
                "",
                "a streamed payload must be consumed as a stream",
            )),
        }
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> crate::Result<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary(bytes) => f.debug_tuple("Binary").field(bytes).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// HTTP response with status, headers, and body.
#[derive(Debug)]
pub struct Response<B = Body> {
    status: u16,
    headers: HeaderMap,
    body: B,
}

impl<B> Response<B> {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: B) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Single header value by name (case-insensitive), if it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderMap, B) {
        (self.status, self.headers, self.body)
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Status is 4xx or 5xx.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_client_error() || self.is_server_error()
    }

    /// Status never carries a body (101, 204, 205, 304).
    #[must_use]
    pub const fn is_bodiless_status(&self) -> bool {
        matches!(self.status, 101 | 204 | 205 | 304)
    }
}
