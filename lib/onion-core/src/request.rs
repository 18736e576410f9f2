//! Outgoing HTTP requests, as handed to the transport.
//!
//! The address is kept as the string the pipeline resolved: it is not parsed
//! or normalized here, the transport decides whether it can reach it.
//!
//! # Example
//!
//! ```
//! use onion_core::{Method, Request};
//! use http::HeaderValue;
//!
//! let request = Request::builder(Method::Get, "https://api.example.com/users")
//!     .header(http::header::ACCEPT, HeaderValue::from_static("application/json"))
//!     .build();
//! assert_eq!(request.header("accept"), Some("application/json"));
//! ```

use bytes::Bytes;
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue};

use crate::Method;

/// An HTTP request with method, address, headers, and optional body.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Resolved request address.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Single header value by name (case-insensitive), if it is valid text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, String, HeaderMap, Option<Bytes>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;

    use super::*;

    #[test]
    fn request_builder_basic() {
        let request = Request::builder(Method::Get, "https://api.example.com/users")
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .build();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url(), "https://api.example.com/users");
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert!(request.body().is_none());
    }

    #[test]
    fn request_keeps_address_verbatim() {
        let request = Request::builder(Method::Get, "/relative//path").build();
        assert_eq!(request.url(), "/relative//path");
    }

    #[test]
    fn request_builder_with_body() {
        let request = Request::builder(Method::Post, "http://h/users")
            .body(r#"{"name":"test"}"#)
            .build();

        let (method, _, _, body) = request.into_parts();
        assert_eq!(method, Method::Post);
        assert_eq!(body, Some(Bytes::from(r#"{"name":"test"}"#)));
    }
}
