//! Request/response logging middleware.
//!
//! This middleware logs pipeline calls using the `tracing` crate.

use std::time::Instant;

use onion_core::{BoxFuture, Middleware, Next, Result};
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::Context;

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level (request/response details).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

/// Middleware that logs requests and responses.
///
/// Place it first to measure the whole call, including the other
/// middlewares.
///
/// # Example
///
/// ```ignore
/// use onion_fetch::{Pipeline, middleware::Logging};
///
/// let pipeline = Pipeline::builder()
///     .middleware(Logging::debug())
///     .build();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging {
    level: LogLevel,
}

impl Logging {
    /// Create a logging middleware with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging middleware that logs at debug level.
    #[must_use]
    pub const fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// Configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl Middleware<Context> for Logging {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a, Context>,
    ) -> BoxFuture<'a, Result<()>> {
        let method = ctx.options.method;
        let resource = ctx.request.clone();
        let level = self.level;

        let span = span!(Level::INFO, "http_request", %method, url = %resource);

        Box::pin(
            async move {
                let start = Instant::now();

                match level {
                    LogLevel::Debug => {
                        debug!(
                            method = %method,
                            url = %resource,
                            headers = ?ctx.options.headers,
                            body = ?ctx.options.body,
                            "sending request"
                        );
                    }
                    LogLevel::Info => {
                        info!(method = %method, url = %resource, "sending request");
                    }
                }

                let result = next.run(ctx).await;

                // Saturating conversion to u64 (truncates after ~584 million years)
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match (&result, ctx.status()) {
                    (Ok(()), Some(status)) => {
                        info!(status, elapsed_ms, url = %ctx.request, "request completed");
                    }
                    (Ok(()), None) => {
                        info!(elapsed_ms, "request completed without response");
                    }
                    (Err(err), Some(status)) => {
                        warn!(status, error = %err, elapsed_ms, "request failed with HTTP error");
                    }
                    (Err(err), None) => {
                        warn!(error = %err, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
