//! Core types and traits for health checking

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{CheckContext, HealthError};

/// Trait for health check implementations
///
/// A probe is a unit of work that, given a cancellable deadline, either
/// succeeds or fails with a reason within bounded time. Leaf probes talk to a
/// dependency; combinators wrap other probes.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Execute the health check
    ///
    /// Returns `Ok(())` if the check passes, or an error describing what went
    /// wrong. Implementations must stop promptly once `ctx` is done.
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError>;
}

/// Shared, type-erased probe as held by combinators and the checker
pub type SharedProbe = Arc<dyn Probe>;

#[async_trait]
impl<P: Probe + ?Sized> Probe for Arc<P> {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        (**self).check(ctx).await
    }
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for Box<P> {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        (**self).check(ctx).await
    }
}

/// Probe backed by an async closure
pub struct ProbeFn<F> {
    f: F,
}

impl<F> fmt::Debug for ProbeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeFn").finish_non_exhaustive()
    }
}

/// Turn an async closure into a probe
///
/// The closure receives its own clone of the context.
///
/// ```rust
/// use vigil_core::health::{probe_fn, CheckContext, HealthError, Probe};
///
/// # async fn example() {
/// let probe = probe_fn(|_ctx: CheckContext| async { Err(HealthError::failed("db down")) });
/// assert!(probe.check(&CheckContext::background()).await.is_err());
/// # }
/// ```
pub fn probe_fn<F, Fut>(f: F) -> ProbeFn<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HealthError>> + Send + 'static,
{
    ProbeFn { f }
}

#[async_trait]
impl<F, Fut> Probe for ProbeFn<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HealthError>> + Send + 'static,
{
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        (self.f)(ctx.clone()).await
    }
}
