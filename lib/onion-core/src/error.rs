//! Error types for onion-fetch.

use std::sync::Arc;

use bytes::Bytes;
use derive_more::{Display, Error};

/// Main error type for onion-fetch operations.
///
/// The type is [`Clone`] so the terminal middleware can record a failure on
/// the request context and still return it up the chain.
#[derive(Debug, Clone, Display, Error)]
pub enum Error {
    /// Malformed configuration (unknown method or response type name, ...).
    #[display("invalid configuration: {_0}")]
    Configuration(#[error(not(source))] String),

    /// A middleware invoked its continuation more than once, or out of order.
    #[display("next() called multiple times")]
    Reentrant,

    /// HTTP-level errors (4xx and 5xx status codes).
    #[display("HTTP error {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Raw response body, if it was buffered.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    Timeout,

    /// The request could not be built.
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] String),

    /// The chain completed without any middleware producing a response.
    #[display("no response was produced by the middleware chain")]
    MissingResponse,

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    JsonSerialization(Arc<serde_json::Error>),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Query string or form url-encoding error.
    #[display("url-encoding error: {_0}")]
    UrlEncoding(Arc<serde_html_form::ser::Error>),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonSerialization(Arc::new(err))
    }
}

impl From<serde_html_form::ser::Error> for Error {
    fn from(err: serde_html_form::ser::Error) -> Self {
        Self::UrlEncoding(Arc::new(err))
    }
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if a middleware advanced the chain twice.
    #[must_use]
    pub const fn is_reentrant(&self) -> bool {
        matches!(self, Self::Reentrant)
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if the transport could not complete the exchange.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_) | Self::Timeout)
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `None` if there is no body or this is not an HTTP error.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}
