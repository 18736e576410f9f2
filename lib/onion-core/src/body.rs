//! Body serialization utilities and response-type detection.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::Result;

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Form URL-encoded content type (`application/x-www-form-urlencoded`).
    FormUrlEncoded,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
        }
    }

    /// Header value for this content type.
    #[must_use]
    pub fn header_value(&self) -> http::HeaderValue {
        http::HeaderValue::from_static(self.as_str())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Response type
// ============================================================================

/// How a response body is turned into a [`crate::Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Decode as JSON.
    Json,
    /// Decode as UTF-8 text (invalid sequences are replaced).
    Text,
    /// Keep the raw bytes.
    Blob,
    /// Keep the raw bytes.
    ArrayBuffer,
    /// Do not read the body; expose it as a stream.
    Stream,
}

impl ResponseType {
    /// Name used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::ArrayBuffer => "arrayBuffer",
            Self::Stream => "stream",
        }
    }

    /// Infer the decoding strategy from a `content-type` header value.
    ///
    /// A missing or empty content type is treated as JSON. Parameters such as
    /// `charset` are ignored.
    #[must_use]
    pub fn detect(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type.filter(|ct| !ct.is_empty()) else {
            return Self::Json;
        };

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if is_json_media_type(&essence) {
            Self::Json
        } else if TEXT_TYPES.contains(&essence.as_str()) || essence.starts_with("text/") {
            Self::Text
        } else {
            Self::Blob
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "blob" => Ok(Self::Blob),
            "arrayBuffer" => Ok(Self::ArrayBuffer),
            "stream" => Ok(Self::Stream),
            other => Err(crate::Error::configuration(format!(
                "unknown response type `{other}`"
            ))),
        }
    }
}

/// Media types decoded as text besides `text/*`.
const TEXT_TYPES: [&str; 4] = [
    "image/svg",
    "application/xml",
    "application/xhtml",
    "application/html",
];

/// `application/json` or `application/<token>+json`, lowercase input.
fn is_json_media_type(essence: &str) -> bool {
    let Some(subtype) = essence.strip_prefix("application/") else {
        return false;
    };
    if subtype == "json" {
        return true;
    }
    subtype.strip_suffix("+json").is_some_and(|prefix| {
        prefix.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || c == '_'
                || matches!(
                    c,
                    '!' | '#' | '$' | '%' | '&' | '*' | '.' | '^' | '`' | '~' | '-'
                )
        })
    })
}

// ============================================================================
// Serialization helpers
// ============================================================================

/// Serialize a value to form URL-encoded bytes.
///
/// Uses `serde_html_form`, which supports repeated fields
/// (e.g., `tags=a&tags=b&tags=c`).
///
/// # Errors
///
/// Returns an error if form serialization fails.
pub fn to_form<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_html_form::to_string(value)
        .map(|s| Bytes::from(s.into_bytes()))
        .map_err(Into::into)
}

/// Serialize a value to a query string (without the leading `?`).
///
/// # Errors
///
/// Returns an error if query serialization fails.
///
/// # Example
///
/// ```
/// use onion_core::to_query_string;
///
/// let query = to_query_string(&[("q", "rust lang"), ("page", "1")]).expect("serialize");
/// assert_eq!(query, "q=rust+lang&page=1");
/// ```
pub fn to_query_string<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_html_form::to_string(value).map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field (e.g., "user.address.city").
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}
