//! Combinators that wrap probes into new probes
//!
//! Every combinator holds only the probes it wraps plus its parameters, and
//! is itself a [`Probe`], so compositions nest freely:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vigil_core::health::{any, probe_fn, with_retries, with_timeout, SharedProbe};
//!
//! let primary: SharedProbe = Arc::new(probe_fn(|_ctx| async { Ok(()) }));
//! let replica: SharedProbe = Arc::new(probe_fn(|_ctx| async { Ok(()) }));
//!
//! let database = with_retries(
//!     with_timeout(any(vec![primary, replica]), Duration::from_secs(2)),
//!     3,
//!     Duration::from_millis(500),
//! );
//! # let _ = database;
//! ```

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use schema::CheckConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{CheckContext, HealthError, Probe, SharedProbe};

/// Bound a probe by a timeout
pub fn with_timeout(probe: SharedProbe, timeout: Duration) -> SharedProbe {
    Arc::new(Timeout { probe, timeout })
}

/// Retry a probe up to `attempts` times, waiting `delay` between attempts.
///
/// A count of zero is treated as a single attempt.
pub fn with_retries(probe: SharedProbe, attempts: u32, delay: Duration) -> SharedProbe {
    Arc::new(Retry {
        probe,
        attempts: attempts.max(1),
        delay,
    })
}

/// Apply a [`CheckConfig`]: each attempt is bounded by the configured timeout
/// and the whole probe is retried per the configured attempts and delay.
pub fn with_config(probe: SharedProbe, config: &CheckConfig) -> SharedProbe {
    with_retries(
        with_timeout(probe, config.timeout()),
        config.retries,
        config.retry_delay(),
    )
}

/// Succeed iff every probe succeeds. An empty set succeeds.
pub fn all(probes: Vec<SharedProbe>) -> SharedProbe {
    Arc::new(AllOf { probes })
}

/// Succeed iff at least one probe succeeds. An empty set fails.
pub fn any(probes: Vec<SharedProbe>) -> SharedProbe {
    Arc::new(AnyOf { probes })
}

/// Succeed iff at least `min` probes succeed.
pub fn with_threshold(min: usize, probes: Vec<SharedProbe>) -> SharedProbe {
    Arc::new(Threshold { min, probes })
}

struct Timeout {
    probe: SharedProbe,
    timeout: Duration,
}

#[async_trait]
impl Probe for Timeout {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        let bounded = ctx.with_timeout(self.timeout);
        let _release = bounded.cancel_on_drop();

        match bounded.run(self.probe.check(&bounded)).await {
            // Our own deadline fired rather than the caller's
            Err(HealthError::DeadlineExceeded) if ctx.err().is_none() => {
                Err(HealthError::Timeout(self.timeout))
            }
            other => other,
        }
    }
}

struct Retry {
    probe: SharedProbe,
    attempts: u32,
    delay: Duration,
}

#[async_trait]
impl Probe for Retry {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        let mut last = None;

        for attempt in 1..=self.attempts {
            match self.probe.check(ctx).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(attempt, attempts = self.attempts, error = %err, "check attempt failed");
                    last = Some(err);
                }
            }

            if attempt < self.attempts {
                // Cancellation while waiting wins over the last probe failure
                ctx.sleep(self.delay).await?;
            }
        }

        Err(last.unwrap_or(HealthError::NoChecks))
    }
}

struct AllOf {
    probes: Vec<SharedProbe>,
}

#[async_trait]
impl Probe for AllOf {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        let group = ctx.child();
        // Dropping the guard on the first failure cancels the remaining probes
        let _release = group.cancel_on_drop();
        let group = &group;

        let mut pending: FuturesUnordered<_> = self
            .probes
            .iter()
            .map(|probe| async move { group.run(probe.check(group)).await })
            .collect();

        while let Some(result) = pending.next().await {
            result.map_err(|err| HealthError::RequiredFailed(Box::new(err)))?;
        }

        Ok(())
    }
}

struct AnyOf {
    probes: Vec<SharedProbe>,
}

#[async_trait]
impl Probe for AnyOf {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        if self.probes.is_empty() {
            return Err(HealthError::NoChecks);
        }

        let (successes, last) = run_to_completion(ctx, &self.probes).await;
        match (successes, last) {
            (0, Some(err)) => Err(HealthError::NoneSucceeded(Box::new(err))),
            (0, None) => Err(HealthError::NoChecks),
            _ => Ok(()),
        }
    }
}

struct Threshold {
    min: usize,
    probes: Vec<SharedProbe>,
}

#[async_trait]
impl Probe for Threshold {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        let (successes, last) = run_to_completion(ctx, &self.probes).await;
        if successes >= self.min {
            return Ok(());
        }

        Err(HealthError::InsufficientSuccesses {
            got: successes,
            want: self.min,
            last: last.map(Box::new),
        })
    }
}

/// Run every probe concurrently to completion.
///
/// Returns the number of successes and the failure that completed last.
async fn run_to_completion(
    ctx: &CheckContext,
    probes: &[SharedProbe],
) -> (usize, Option<HealthError>) {
    let mut pending: FuturesUnordered<_> = probes
        .iter()
        .map(|probe| async move { ctx.run(probe.check(ctx)).await })
        .collect();

    let mut successes = 0;
    let mut last = None;
    while let Some(result) = pending.next().await {
        match result {
            Ok(()) => successes += 1,
            Err(err) => last = Some(err),
        }
    }

    (successes, last)
}
