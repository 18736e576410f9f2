//! Onion-style middleware composition.
//!
//! [`compose`] turns an ordered list of [`Middleware`]s into a [`Composed`]
//! dispatcher. Running it calls the first middleware with the context and a
//! [`Next`] continuation; each middleware may work on the context, await
//! [`Next::run`] to hand over to the rest of the chain, then work on the
//! context again once the inner links have completed:
//!
//! ```text
//! A.before -> B.before -> C.before -> (end) -> C.after -> B.after -> A.after
//! ```
//!
//! A middleware that never calls its continuation ends the chain there. Each
//! position of a chain may be entered at most once per run: calling a
//! continuation a second time yields [`Error::Reentrant`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use onion_core::{Middleware, compose, from_fn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> onion_core::Result<()> {
//! let greet: Arc<dyn Middleware<Vec<String>>> = Arc::new(from_fn::<Vec<String>, _>(|log, next| {
//!     Box::pin(async move {
//!         log.push("hello".to_string());
//!         next.run(log).await?;
//!         log.push("bye".to_string());
//!         Ok(())
//!     })
//! }));
//!
//! let chain = compose([greet]);
//! let mut log = Vec::new();
//! chain.run(&mut log).await?;
//! assert_eq!(log, ["hello", "bye"]);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{trace, warn};

use crate::{Error, Result};

/// Boxed, `Send` future used at every middleware boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A link of an onion chain.
///
/// Implementors receive exclusive access to the context for the duration of
/// their future, and the continuation to the rest of the chain.
pub trait Middleware<C>: Send + Sync + 'static {
    /// Process the context, optionally delegating to `next`.
    fn handle<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C>) -> BoxFuture<'a, Result<()>>;
}

/// Shared middlewares delegate to the inner value.
impl<C, M> Middleware<C> for Arc<M>
where
    M: Middleware<C> + ?Sized,
{
    fn handle<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C>) -> BoxFuture<'a, Result<()>> {
        (**self).handle(ctx, next)
    }
}

// ============================================================================
// Continuation
// ============================================================================

/// High-water mark of a single run: `0` before the first dispatch, then the
/// last dispatched position plus one.
#[derive(Debug, Default)]
struct Cursor(AtomicUsize);

impl Cursor {
    /// Record `position` as dispatched; `false` if it was not ahead of the mark.
    fn advance(&self, position: usize) -> bool {
        self.0.fetch_max(position + 1, Ordering::AcqRel) <= position
    }
}

/// Continuation handed to a middleware: the rest of the chain.
pub struct Next<'a, C> {
    chain: &'a [Arc<dyn Middleware<C>>],
    position: usize,
    cursor: &'a Cursor,
    tail: Option<&'a Next<'a, C>>,
}

impl<C> Clone for Next<'_, C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            position: self.position,
            cursor: self.cursor,
            tail: self.tail,
        }
    }
}

impl<C> fmt::Debug for Next<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("position", &self.position)
            .field("len", &self.chain.len())
            .field("nested", &self.tail.is_some())
            .finish()
    }
}

impl<'a, C: Send + 'static> Next<'a, C> {
    /// Run the rest of the chain against `ctx`.
    ///
    /// Resolves once every inner link has completed. An error raised by any
    /// inner link is returned here, where the caller may recover from it or
    /// propagate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reentrant`] if this position was already dispatched
    /// during the current run, or the first error of the inner links.
    pub fn run<'b>(&'b self, ctx: &'b mut C) -> BoxFuture<'b, Result<()>> {
        let position = self.position;
        if !self.cursor.advance(position) {
            warn!(position, "next() called multiple times");
            return Box::pin(future::ready(Err(Error::Reentrant)));
        }
        trace!(position, len = self.chain.len(), "dispatch");

        match self.chain.get(position) {
            Some(middleware) => {
                let next = Next {
                    chain: self.chain,
                    position: position + 1,
                    cursor: self.cursor,
                    tail: self.tail,
                };
                middleware.handle(ctx, next)
            }
            None => match self.tail {
                Some(tail) => tail.run(ctx),
                None => Box::pin(future::ready(Ok(()))),
            },
        }
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Dispatcher built by [`compose`].
///
/// The dispatcher holds no per-run state: each call to [`Composed::run`]
/// gets its own cursor, so one instance can serve any number of concurrent
/// runs.
pub struct Composed<C> {
    chain: Arc<[Arc<dyn Middleware<C>>]>,
}

/// Compose middlewares into a single dispatcher, in onion order.
///
/// The first middleware is the outermost layer.
pub fn compose<C, I>(middlewares: I) -> Composed<C>
where
    I: IntoIterator<Item = Arc<dyn Middleware<C>>>,
{
    Composed {
        chain: middlewares.into_iter().collect(),
    }
}

impl<C> Composed<C> {
    /// Number of middlewares in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` if the chain has no middleware.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl<C: Send + 'static> Composed<C> {
    /// Run the chain against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised and not recovered by a middleware.
    pub fn run<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, Result<()>> {
        self.run_with(ctx, None)
    }

    /// Run the chain against `ctx`, continuing with `tail` after the last link.
    ///
    /// This is how a composed chain nests inside an outer one: `tail` is the
    /// outer continuation.
    ///
    /// # Errors
    ///
    /// Returns the first error raised and not recovered by a middleware,
    /// including errors of `tail`.
    pub fn run_with<'a>(
        &'a self,
        ctx: &'a mut C,
        tail: Option<&'a Next<'a, C>>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let cursor = Cursor::default();
            let next = Next {
                chain: &self.chain,
                position: 0,
                cursor: &cursor,
                tail,
            };
            next.run(ctx).await
        })
    }
}

impl<C> Clone for Composed<C> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<C> fmt::Debug for Composed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composed")
            .field("len", &self.chain.len())
            .finish()
    }
}

/// A composed chain is itself a middleware: the outer continuation runs
/// after its last link.
impl<C: Send + 'static> Middleware<C> for Composed<C> {
    fn handle<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.run_with(ctx, Some(&next)).await })
    }
}

// ============================================================================
// Closures
// ============================================================================

/// Middleware backed by a closure, see [`from_fn`].
#[derive(Clone)]
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

/// Lift a closure into a [`Middleware`].
///
/// The closure returns a boxed future, usually `Box::pin(async move { .. })`.
pub fn from_fn<C, F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut C, Next<'a, C>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnMiddleware { f }
}

impl<C, F> Middleware<C> for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut C, Next<'a, C>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C>) -> BoxFuture<'a, Result<()>> {
        (self.f)(ctx, next)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::{check, let_assert};

    use super::*;

    type Trace = Vec<String>;

    fn layer(name: &'static str) -> Arc<dyn Middleware<Trace>> {
        Arc::new(from_fn::<Trace, _>(move |trace, next| {
            Box::pin(async move {
                trace.push(format!("{name}.before"));
                next.run(trace).await?;
                trace.push(format!("{name}.after"));
                Ok(())
            })
        }))
    }

    fn terminal() -> Arc<dyn Middleware<Trace>> {
        Arc::new(from_fn::<Trace, _>(|trace, next| {
            Box::pin(async move {
                trace.push("T".to_string());
                next.run(trace).await
            })
        }))
    }

    fn failing(status: u16) -> Arc<dyn Middleware<Trace>> {
        Arc::new(from_fn::<Trace, _>(move |trace, _next| {
            Box::pin(async move {
                trace.push("fail".to_string());
                Err(Error::http(status, "boom"))
            })
        }))
    }

    #[tokio::test]
    async fn runs_in_onion_order() {
        let chain = compose([layer("A"), layer("B"), layer("C"), terminal()]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("run");

        assert_eq!(
            trace,
            [
                "A.before", "B.before", "C.before", "T", "C.after", "B.after", "A.after"
            ]
        );
    }

    #[tokio::test]
    async fn empty_chain_resolves() {
        let chain = compose::<Trace, _>([]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("run");

        check!(chain.is_empty());
        check!(trace.is_empty());
    }

    async fn run_each<C: Send + 'static>(chain: &Composed<C>, contexts: &mut [C]) -> Result<()> {
        for ctx in contexts {
            chain.run(ctx).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn chain_runs_over_any_owned_context() {
        #[derive(Default)]
        struct Counter(u32);

        let bump: Arc<dyn Middleware<Counter>> = Arc::new(from_fn::<Counter, _>(|counter, next| {
            Box::pin(async move {
                counter.0 += 1;
                next.run(counter).await
            })
        }));
        let chain = compose([Arc::clone(&bump), bump]);
        let mut counters = [Counter::default(), Counter::default()];

        run_each(&chain, &mut counters).await.expect("run");

        check!(counters.iter().all(|c| c.0 == 2));
    }

    #[tokio::test]
    async fn calling_next_twice_is_rejected() {
        let twice: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(|trace, next| {
            Box::pin(async move {
                next.run(trace).await?;
                next.run(trace).await
            })
        }));
        let chain = compose([layer("A"), twice, terminal()]);
        let mut trace = Trace::new();

        let result = chain.run(&mut trace).await;

        let_assert!(Err(Error::Reentrant) = result);
        // A observed the failure from its own continuation, so no A.after
        assert_eq!(trace, ["A.before", "T"]);
    }

    #[tokio::test]
    async fn cloned_continuation_shares_the_cursor() {
        let cloning: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(|trace, next| {
            Box::pin(async move {
                let again = next.clone();
                next.run(trace).await?;
                again.run(trace).await
            })
        }));
        let chain = compose([cloning, layer("B"), terminal()]);
        let mut trace = Trace::new();

        let result = chain.run(&mut trace).await;

        let_assert!(Err(err) = result);
        check!(err.is_reentrant());
        assert_eq!(trace, ["B.before", "T", "B.after"]);
    }

    #[tokio::test]
    async fn retry_after_failure_is_rejected() {
        let retry: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(|trace, next| {
            Box::pin(async move {
                if next.run(trace).await.is_err() {
                    return next.run(trace).await;
                }
                Ok(())
            })
        }));
        let chain = compose([retry, failing(503)]);
        let mut trace = Trace::new();

        let result = chain.run(&mut trace).await;

        let_assert!(Err(Error::Reentrant) = result);
        assert_eq!(trace, ["fail"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let cached: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(|trace, _next| {
            Box::pin(async move {
                trace.push("cached".to_string());
                Ok(())
            })
        }));
        let chain = compose([layer("A"), cached, layer("C"), terminal()]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("run");

        assert_eq!(trace, ["A.before", "cached", "A.after"]);
    }

    #[tokio::test]
    async fn errors_propagate_through_the_stack() {
        let chain = compose([layer("A"), layer("B"), failing(500)]);
        let mut trace = Trace::new();

        let result = chain.run(&mut trace).await;

        let_assert!(Err(err) = result);
        check!(err.status() == Some(500));
        assert_eq!(trace, ["A.before", "B.before", "fail"]);
    }

    #[tokio::test]
    async fn middleware_can_recover_from_inner_errors() {
        let recover: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(|trace, next| {
            Box::pin(async move {
                if let Err(err) = next.run(trace).await {
                    trace.push(format!("recovered {}", err.status().unwrap_or_default()));
                }
                Ok(())
            })
        }));
        let chain = compose([layer("A"), recover, failing(500)]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("recovered");

        assert_eq!(trace, ["A.before", "fail", "recovered 500", "A.after"]);
    }

    #[tokio::test]
    async fn nested_chain_continues_with_outer_links() {
        let inner: Arc<dyn Middleware<Trace>> = Arc::new(compose([layer("B"), layer("C")]));
        let chain = compose([layer("A"), inner, layer("D"), terminal()]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("run");

        assert_eq!(
            trace,
            [
                "A.before", "B.before", "C.before", "D.before", "T", "D.after", "C.after",
                "B.after", "A.after"
            ]
        );
    }

    #[tokio::test]
    async fn shared_middleware_is_a_middleware() {
        let shared = layer("A");
        let wrapped: Arc<dyn Middleware<Trace>> = Arc::new(Arc::clone(&shared));
        let chain = compose([wrapped, shared, terminal()]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("run");

        assert_eq!(trace, ["A.before", "A.before", "T", "A.after", "A.after"]);
    }

    #[tokio::test]
    async fn run_with_uses_the_final_continuation() {
        let inner = compose([layer("B")]);
        let outer: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(move |trace, next| {
            let inner = inner.clone();
            Box::pin(async move { inner.run_with(trace, Some(&next)).await })
        }));
        let chain = compose([outer, terminal()]);
        let mut trace = Trace::new();

        chain.run(&mut trace).await.expect("run");

        assert_eq!(trace, ["B.before", "T", "B.after"]);
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_share_the_cursor() {
        let slow: Arc<dyn Middleware<Trace>> = Arc::new(from_fn::<Trace, _>(|trace, next| {
            Box::pin(async move {
                trace.push("slow.before".to_string());
                tokio::time::sleep(Duration::from_millis(10)).await;
                next.run(trace).await?;
                trace.push("slow.after".to_string());
                Ok(())
            })
        }));
        let chain = compose([layer("A"), slow, terminal()]);
        let mut first = Trace::new();
        let mut second = Trace::new();

        let (a, b) = tokio::join!(chain.run(&mut first), chain.run(&mut second));
        a.expect("first run");
        b.expect("second run");

        let expected = [
            "A.before",
            "slow.before",
            "T",
            "slow.after",
            "A.after",
        ];
        assert_eq!(first, expected);
        assert_eq!(second, expected);

        // and once more, sequentially, on the same dispatcher
        let mut third = Trace::new();
        chain.run(&mut third).await.expect("third run");
        assert_eq!(third, expected);
    }
}
