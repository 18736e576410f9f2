//! Bundled middlewares for [`Pipeline`](crate::Pipeline)s.
//!
//! - [`Logging`] - Logs requests and responses using `tracing`
//! - [`BearerAuth`] - Adds `Authorization: Bearer <token>` from a token source
//!
//! Any closure of the right shape is a middleware too, see [`middleware_fn`].
//!
//! # Example
//!
//! ```ignore
//! use onion_fetch::{HeaderValue, Pipeline, middleware::BearerAuth};
//!
//! let pipeline = Pipeline::builder()
//!     .with_logging()
//!     .middleware(BearerAuth::from_source(|| std::env::var("API_TOKEN").ok()))
//!     .middleware_fn(|ctx, next| {
//!         Box::pin(async move {
//!             ctx.options.headers.insert("x-client", HeaderValue::from_static("demo"));
//!             next.run(ctx).await
//!         })
//!     })
//!     .build();
//! ```

mod bearer_auth;
mod logging;

pub use bearer_auth::BearerAuth;
pub use logging::{LogLevel, Logging};

use onion_core::{BoxFuture, FnMiddleware, Next, Result, from_fn};

use crate::Context;

/// Lift a closure into a pipeline middleware.
///
/// Same as [`from_fn`], with the context type fixed to [`Context`].
pub fn middleware_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a, Context>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    from_fn::<Context, F>(f)
}
