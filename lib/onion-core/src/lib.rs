//! Core types for the onion-fetch HTTP pipeline.
//!
//! This crate provides the foundational pieces used by onion-fetch:
//! - [`compose`] and [`Middleware`] - Onion-style middleware composition
//! - [`Next`] - Continuation to the rest of a chain
//! - [`Method`] - HTTP method enum
//! - [`Request`] and [`RequestBuilder`] - Requests handed to a transport
//! - [`Response`], [`Body`] and [`Payload`] - Raw and decoded responses
//! - [`ResponseType`] - Response decoding strategies and their detection
//! - [`Error`] and [`Result`] - Error handling
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)
//!
//! The composition engine knows nothing about HTTP: it works on any context
//! type that can be sent across threads.

mod body;
mod compose;
mod error;
mod method;
pub mod prelude;
mod request;
mod response;

pub use body::{ContentType, ResponseType, from_json, to_form, to_query_string};
pub use compose::{BoxFuture, Composed, FnMiddleware, Middleware, Next, compose, from_fn};
pub use error::{Error, Result};
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::{Body, Payload, Response, StreamingBody};

// Re-export http crate types for status codes and headers
pub use http::{HeaderMap, HeaderValue, StatusCode, header};
