//! Bearer token authentication middleware.
//!
//! This middleware adds an `Authorization: Bearer <token>` header to
//! outgoing requests that do not carry one already.

use std::fmt;
use std::sync::Arc;

use http::header::AUTHORIZATION;
use onion_core::{BoxFuture, Error, HeaderValue, Middleware, Next, Result};

use crate::Context;

type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Middleware that authenticates requests with a bearer token.
///
/// The token is read from its source on every call, so a source backed by a
/// refreshable store always sends the current token. When the source has no
/// token, the request goes out unauthenticated.
///
/// # Example
///
/// ```ignore
/// use onion_fetch::{Pipeline, middleware::BearerAuth};
///
/// let pipeline = Pipeline::builder()
///     .middleware(BearerAuth::new("my-secret-token"))
///     .build();
/// ```
#[derive(Clone)]
pub struct BearerAuth {
    source: TokenSource,
}

impl BearerAuth {
    /// Authenticate with a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        let token: Arc<str> = Arc::from(token.into());
        Self::from_source(move || Some(token.to_string()))
    }

    /// Authenticate with the token returned by `source` at call time.
    pub fn from_source<F>(source: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(source),
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}

impl Middleware<Context> for BearerAuth {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a, Context>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !ctx.options.headers.contains_key(AUTHORIZATION)
                && let Some(token) = (self.source)()
            {
                let mut value = HeaderValue::try_from(format!("Bearer {token}"))
                    .map_err(|e| Error::invalid_request(format!("bearer token: {e}")))?;
                value.set_sensitive(true);
                ctx.options.headers.insert(AUTHORIZATION, value);
            }

            next.run(ctx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert2::{check, let_assert};
    use onion_core::compose;

    use super::*;
    use crate::{DynMiddleware, Options};

    fn run_auth(auth: BearerAuth, options: Options) -> (Result<()>, Context) {
        let chain = compose([Arc::new(auth) as DynMiddleware]);
        let mut ctx = Context::new("/secure", options);
        let result = futures_util::FutureExt::now_or_never(chain.run(&mut ctx))
            .expect("no await point in the chain");
        (result, ctx)
    }

    #[test]
    fn static_token_is_added() {
        let (result, ctx) = run_auth(BearerAuth::new("abc"), Options::new());

        check!(result.is_ok());
        let_assert!(Some(value) = ctx.options.headers.get(AUTHORIZATION));
        check!(value == "Bearer abc");
        check!(value.is_sensitive());
    }

    #[test]
    fn existing_authorization_wins() {
        let options = Options::new().header(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        let (_, ctx) = run_auth(BearerAuth::new("abc"), options);

        check!(ctx.options.headers[AUTHORIZATION] == "Basic xyz");
    }

    #[test]
    fn source_is_read_on_every_call() {
        let current = Arc::new(Mutex::new(None::<String>));
        let source = Arc::clone(&current);
        let auth = BearerAuth::from_source(move || {
            source
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        });

        let (_, ctx) = run_auth(auth.clone(), Options::new());
        check!(ctx.options.headers.get(AUTHORIZATION).is_none());

        *current.lock().expect("lock") = Some("fresh".to_string());
        let (_, ctx) = run_auth(auth, Options::new());
        check!(ctx.options.headers[AUTHORIZATION] == "Bearer fresh");
    }

    #[test]
    fn invalid_token_is_rejected() {
        let (result, _) = run_auth(BearerAuth::new("bad\ntoken"), Options::new());
        let_assert!(Err(Error::InvalidRequest(_)) = result);
    }
}
