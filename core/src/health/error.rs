//! Error types for health check operations

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Reasons a probe can fail
///
/// The type is `Clone` so background probes can hand out their cached verdict
/// to every concurrent caller.
#[derive(Error, Debug, Clone)]
pub enum HealthError {
    /// The probe reported an ordinary failure
    #[error("{0}")]
    Failed(String),

    /// The caller's context was cancelled
    #[error("context canceled")]
    Cancelled,

    /// The caller's context deadline elapsed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The health check timed out
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// TCP connection failed
    #[error("tcp connection failed: {0}")]
    Tcp(Arc<std::io::Error>),

    /// A required sub-check of an all-of composition failed
    #[error("required check failed: {0}")]
    RequiredFailed(Box<HealthError>),

    /// No sub-check of an any-of composition succeeded
    #[error("all checks failed: {0}")]
    NoneSucceeded(Box<HealthError>),

    /// A composition had no sub-checks to draw a success from
    #[error("no checks to evaluate")]
    NoChecks,

    /// A threshold composition saw too few successes
    #[error("insufficient successful checks: got {got}, want {want}{}", last_failure(.last))]
    InsufficientSuccesses {
        got: usize,
        want: usize,
        last: Option<Box<HealthError>>,
    },

    /// A background probe has not completed its first refresh
    #[error("{0} has not completed an initial run")]
    NotInitialized(String),

    /// A background probe's cached result is older than its freshness window
    #[error("{name} result stale: last={age:?} allowed={allowed:?}")]
    Stale {
        name: String,
        age: Duration,
        allowed: Duration,
    },

    /// Invalid probe parameters, rejected before anything starts
    #[error("invalid probe configuration: {0}")]
    Config(String),
}

fn last_failure(last: &Option<Box<HealthError>>) -> String {
    match last {
        Some(err) => format!(": {err}"),
        None => String::new(),
    }
}

impl HealthError {
    /// Build an ordinary failure from any message
    pub fn failed(message: impl Into<String>) -> Self {
        HealthError::Failed(message.into())
    }

    /// Whether the failure was caused by cancellation or an elapsed deadline
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            HealthError::Cancelled | HealthError::DeadlineExceeded | HealthError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for HealthError {
    fn from(err: std::io::Error) -> Self {
        HealthError::Tcp(Arc::new(err))
    }
}
