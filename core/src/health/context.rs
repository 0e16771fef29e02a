//! Cancellable, deadline-aware execution context handed to every probe

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::HealthError;

/// Execution context for a single check
///
/// A context pairs a [`CancellationToken`] with an optional deadline. Derived
/// contexts use child tokens, so cancelling a parent reaches every descendant,
/// and their deadline is never later than the parent's.
///
/// Probes must not keep a context past the end of their own call.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CheckContext {
    /// A fresh context with no deadline that is never cancelled on its own
    pub fn background() -> Self {
        Self::default()
    }

    /// A context driven by an existing cancellation token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child context that can be cancelled independently
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context whose deadline is at most `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child context that expires `timeout` from now
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Guard that cancels this context when dropped
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Reason this context is done, or `None` while it is still live
    pub fn err(&self) -> Option<HealthError> {
        if self.token.is_cancelled() {
            return Some(HealthError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(HealthError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> HealthError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => HealthError::Cancelled,
                    _ = sleep_until(deadline) => HealthError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                HealthError::Cancelled
            }
        }
    }

    /// Drive `fut` until it completes or the context is done.
    ///
    /// Probes that do not watch the context themselves are still cut off
    /// promptly; the future is dropped as soon as the context ends.
    pub async fn run<F>(&self, fut: F) -> Result<(), HealthError>
    where
        F: Future<Output = Result<(), HealthError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            result = fut => result,
            err = self.done() => Err(err),
        }
    }

    /// Sleep for `duration` unless the context ends first
    pub async fn sleep(&self, duration: Duration) -> Result<(), HealthError> {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            _ = sleep(duration) => Ok(()),
        }
    }
}
