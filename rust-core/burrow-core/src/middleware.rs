//! # Middleware Executor
//!
//! Onion-model composition of async middleware around a final action.
//!
//! Each middleware receives the request context and a one-shot [`Next`]
//! continuation. Code before `next.run().await` runs on the way in, in
//! registration order; code after it runs on the way out, in reverse order.
//! A middleware that never runs `next` ends the chain there.
//!
//! ```ignore
//! let mut chain = MiddlewareChain::new();
//! chain.add(|ctx: Context, next: Next<Context>| async move {
//!     let started = Instant::now();
//!     next.run().await?;
//!     tracing::info!(elapsed = ?started.elapsed(), "done");
//!     Ok(())
//! });
//! chain.execute(ctx, move || async move { handler(ctx).await }).await?;
//! ```
//!
//! ## Invariants
//!
//! - A continuation runs the rest of the chain at most once; a second call
//!   fails with [`Error::InvalidContinuation`].
//! - A chain position is never dispatched twice for the same request.
//! - Once the context reports a committed response, or the final action has
//!   started, further continuations are no-ops.
//!
//! Errors from a middleware or the final action propagate out of
//! [`MiddlewareChain::execute`] unchanged; recovery belongs to a middleware
//! placed first in the chain.

use crate::error::{Error, Result};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared middleware trait object
pub type BoxedMiddleware<C> = Arc<dyn Middleware<C>>;

type FinalAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Signal polled by the executor before every dispatch step
pub trait Committed {
    /// Whether a response has already been produced for this request
    fn is_committed(&self) -> bool;
}

/// Middleware trait for request/response interception
///
/// Implemented for any `Fn(C, Next<C>) -> impl Future<Output = Result<()>>`,
/// so plain async closures can be used directly.
pub trait Middleware<C>: Send + Sync + 'static {
    /// Handle the request, calling `next.run()` to continue the chain
    fn handle(&self, ctx: C, next: Next<C>) -> BoxFuture<'static, Result<()>>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "anonymous"
    }
}

impl<C, F, Fut> Middleware<C> for F
where
    F: Fn(C, Next<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, ctx: C, next: Next<C>) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(ctx, next))
    }
}

/// Per-request execution state
struct Frame<C> {
    chain: Arc<Vec<BoxedMiddleware<C>>>,
    ctx: C,
    /// One past the highest index dispatched so far
    cursor: AtomicUsize,
    finished: AtomicBool,
    final_action: Mutex<Option<FinalAction>>,
}

impl<C: Committed> Frame<C> {
    fn halted(&self) -> bool {
        self.finished.load(Ordering::Acquire) || self.ctx.is_committed()
    }
}

/// One-shot continuation handed to each middleware
///
/// Running it resumes the rest of the chain. It may be awaited after any
/// amount of async work, but only once.
pub struct Next<C> {
    frame: Arc<Frame<C>>,
    index: usize,
    called: AtomicBool,
}

impl<C> Next<C>
where
    C: Committed + Clone + Send + Sync + 'static,
{
    fn new(frame: Arc<Frame<C>>, index: usize) -> Self {
        Self {
            frame,
            index,
            called: AtomicBool::new(false),
        }
    }

    /// Run the remainder of the chain
    ///
    /// Returns immediately if the response is already committed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidContinuation` when called a second time, and
    /// otherwise whatever the downstream middleware or final action returned.
    pub async fn run(&self) -> Result<()> {
        if self.called.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidContinuation { index: self.index });
        }
        if self.frame.halted() {
            return Ok(());
        }
        dispatch(Arc::clone(&self.frame), self.index + 1).await
    }

    /// Whether this continuation has been run
    pub fn is_called(&self) -> bool {
        self.called.load(Ordering::Acquire)
    }
}

impl<C> fmt::Debug for Next<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("called", &self.called.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn dispatch<C>(frame: Arc<Frame<C>>, index: usize) -> BoxFuture<'static, Result<()>>
where
    C: Committed + Clone + Send + Sync + 'static,
{
    Box::pin(async move {
        if frame.halted() {
            return Ok(());
        }

        let previous = frame.cursor.fetch_max(index + 1, Ordering::AcqRel);
        if index < previous {
            return Err(Error::InvalidContinuation { index });
        }

        if index == frame.chain.len() {
            frame.finished.store(true, Ordering::Release);
            let action = frame
                .final_action
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            trace!(index, "running final action");
            return match action {
                Some(action) => action().await,
                None => Ok(()),
            };
        }

        let middleware = Arc::clone(&frame.chain[index]);
        let ctx = frame.ctx.clone();
        trace!(index, middleware = middleware.name(), "entering middleware");
        middleware.handle(ctx, Next::new(frame, index)).await
    })
}

/// Ordered middleware chain and its executor
///
/// Append-only while the application is being set up; executing it only
/// needs `&self`, so one chain serves any number of concurrent requests.
pub struct MiddlewareChain<C> {
    middlewares: Arc<Vec<BoxedMiddleware<C>>>,
}

impl<C> Default for MiddlewareChain<C> {
    fn default() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }
}

impl<C> Clone for MiddlewareChain<C> {
    fn clone(&self) -> Self {
        Self {
            middlewares: Arc::clone(&self.middlewares),
        }
    }
}

impl<C: 'static> fmt::Debug for MiddlewareChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<C> FromIterator<BoxedMiddleware<C>> for MiddlewareChain<C> {
    fn from_iter<I: IntoIterator<Item = BoxedMiddleware<C>>>(iter: I) -> Self {
        Self {
            middlewares: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl<C: 'static> MiddlewareChain<C> {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the end of the chain
    pub fn add<M: Middleware<C>>(&mut self, middleware: M) {
        self.push(Arc::new(middleware));
    }

    /// Add an already shared middleware to the end of the chain
    pub fn push(&mut self, middleware: BoxedMiddleware<C>) {
        Arc::make_mut(&mut self.middlewares).push(middleware);
    }

    /// Names of the middleware, in execution order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl<C> MiddlewareChain<C>
where
    C: Committed + Clone + Send + Sync + 'static,
{
    /// Run the chain around `final_action`
    ///
    /// The final action runs at most once, and only if every middleware
    /// continued and no response was committed on the way in.
    ///
    /// # Errors
    ///
    /// Propagates the first error raised by a middleware or the final action,
    /// including `Error::InvalidContinuation` for a reused continuation.
    pub async fn execute<F, Fut>(&self, ctx: C, final_action: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let final_action: FinalAction = Box::new(move || Box::pin(final_action()));
        let frame = Arc::new(Frame {
            chain: Arc::clone(&self.middlewares),
            ctx,
            cursor: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            final_action: Mutex::new(Some(final_action)),
        });
        dispatch(frame, 0).await
    }
}
