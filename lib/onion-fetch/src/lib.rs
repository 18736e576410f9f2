//! HTTP request pipeline with onion-style middlewares.
//!
//! Every call builds a fresh [`Context`] and runs it through the global
//! middlewares, the per-call middlewares, and finally the terminal network
//! middleware. Each middleware can work on the context before and after the
//! rest of the chain:
//!
//! ```text
//! global -> per-call -> fetch -> per-call -> global
//! ```
//!
//! # Example
//!
//! ```ignore
//! use onion_fetch::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let pipeline = Pipeline::builder()
//!     .base_url("https://api.example.com")
//!     .middleware_fn(|ctx, next| {
//!         Box::pin(async move {
//!             ctx.options.headers.insert("x-client", HeaderValue::from_static("demo"));
//!             next.run(ctx).await
//!         })
//!     })
//!     .build();
//!
//! let user: User = pipeline.json("/users/42", Options::new()).await?;
//! ```
//!
//! The network call goes through [`HyperClient`] unless another
//! [`tower::Service`] is handed to [`PipelineBuilder::transport`].

mod client;
mod config;
mod connector;
pub mod middleware;
mod pipeline;
pub mod prelude;
mod terminal;

// Re-export transport types
pub use client::{BoxedTransport, HyperClient, HyperClientBuilder, TransportFuture};
pub use config::{ClientConfig, ClientConfigBuilder};

// Re-export pipeline types
pub use middleware::middleware_fn;
pub use pipeline::{
    Context, DynMiddleware, Options, Pipeline, PipelineBuilder, PipelineConfig, RequestBody,
};

// Re-export tower for custom transports
pub use tower;

// Re-export core types
pub use onion_core::{
    Body, BoxFuture, Composed, ContentType, Error, FnMiddleware, Method, Middleware, Next, Payload,
    Request, RequestBuilder, Response, ResponseType, Result, StreamingBody, compose, from_fn,
    from_json, to_form, to_query_string,
};

// Re-export http types for status codes and headers
pub use onion_core::{HeaderMap, HeaderValue, StatusCode, header};
