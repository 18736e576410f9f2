//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions
//! for easy glob importing:
//!
//! ```ignore
//! use onion_fetch::prelude::*;
//! ```

pub use crate::{
    BoxFuture, ClientConfig, Context, Error, HeaderValue, HyperClient, Method, Middleware, Next,
    Options, Payload, Pipeline, RequestBody, Response, ResponseType, Result, StatusCode, header,
    middleware_fn,
};
pub use serde::{Deserialize, Serialize};
