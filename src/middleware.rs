//! Middleware composition for driver operations.
//!
//! A layer takes the next operation and returns a decorated operation with the
//! same signature. The chain is folded once and the composed operation reused
//! for every call.
//!
//! ```text
//! caller ──► stats ──► trace ──► wrap_rows ──► driver
//!                                              │
//! caller ◄── stats ◄── trace ◄── wrap_rows ◄───┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::driver::{NamedValue, QueryOutcome};
use crate::error::QueryError;

/// An operation executing a query.
#[async_trait]
pub trait QueryContext: Send + Sync {
    async fn query(&self, ctx: CallContext, query: &str, args: &[NamedValue]) -> QueryOutcome;
}

/// Shared handle to a (possibly decorated) query operation.
pub type QueryContextFn = Arc<dyn QueryContext>;

/// A stateless decorator around a [`QueryContext`].
pub trait QueryMiddleware: Send + Sync {
    /// Layer name for identification and logging.
    fn name(&self) -> &'static str;

    /// Returns `next` decorated with this layer's behavior.
    fn wrap(&self, next: QueryContextFn) -> QueryContextFn;
}

/// Applies `middlewares` to `base`. The first middleware is the outermost.
pub fn chain_query_middlewares(
    middlewares: &[Arc<dyn QueryMiddleware>],
    base: QueryContextFn,
) -> QueryContextFn {
    middlewares
        .iter()
        .rev()
        .fold(base, |next, middleware| middleware.wrap(next))
}

/// Queries nothing.
pub struct NopQuery;

#[async_trait]
impl QueryContext for NopQuery {
    async fn query(&self, _ctx: CallContext, _query: &str, _args: &[NamedValue]) -> QueryOutcome {
        Ok(None)
    }
}

/// Always returns [`QueryError::Skip`].
pub struct SkippedQuery;

#[async_trait]
impl QueryContext for SkippedQuery {
    async fn query(&self, _ctx: CallContext, _query: &str, _args: &[NamedValue]) -> QueryOutcome {
        Err(QueryError::Skip)
    }
}

/// Runs a finalizer exactly once.
///
/// [`Finalizer::finish`] reports the real outcome. If the guard is dropped
/// first (the delegate panicked or the future was cancelled), the finalizer
/// sees [`QueryError::Interrupted`].
pub(crate) struct Finalizer<F>
where
    F: FnOnce(Option<&QueryError>),
{
    end: Option<F>,
}

impl<F> Finalizer<F>
where
    F: FnOnce(Option<&QueryError>),
{
    pub(crate) fn new(end: F) -> Self {
        Self { end: Some(end) }
    }

    pub(crate) fn finish(mut self, err: Option<&QueryError>) {
        if let Some(end) = self.end.take() {
            end(err);
        }
    }
}

impl<F> Drop for Finalizer<F>
where
    F: FnOnce(Option<&QueryError>),
{
    fn drop(&mut self) {
        if let Some(end) = self.end.take() {
            end(Some(&QueryError::Interrupted));
        }
    }
}
