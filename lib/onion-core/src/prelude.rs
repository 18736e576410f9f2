//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions
//! for easy glob importing:
//!
//! ```ignore
//! use onion_core::prelude::*;
//! ```

pub use crate::{
    Body, BoxFuture, Composed, ContentType, Error, Method, Middleware, Next, Payload, Request,
    Response, ResponseType, Result, compose, from_fn, from_json,
};
