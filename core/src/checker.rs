//! Health checker: an ordered set of targets evaluated concurrently
//!
//! Every evaluation fans out one task per registered target and fans back in
//! into a result vector that is index-addressed by registration position, so
//! the output order never depends on which probe finished first.
//!
//! A failing probe only marks its own result as failed. It never cancels its
//! siblings and never aborts the batch; the only error [`HealthChecker::evaluate`]
//! returns is a failure of the evaluation machinery itself.

use schema::{HealthCheckResult, TargetImportance, TargetInfo};
use std::fmt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::health::{CheckContext, SharedProbe};
use crate::{CoreError, Result};

/// Options applied when registering a target
///
/// Defaults to high importance with no icon and no group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOptions {
    pub importance: TargetImportance,
    pub icon: Option<String>,
    pub group: Option<String>,
}

impl TargetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the importance level of the target
    #[must_use]
    pub fn with_importance(mut self, importance: TargetImportance) -> Self {
        self.importance = importance;
        self
    }

    /// Set the icon CSS class name of the target
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Set the group name; targets with the same group are displayed together
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// A named registration of one probe
#[derive(Clone)]
pub struct HealthTarget {
    info: TargetInfo,
    probe: SharedProbe,
}

impl HealthTarget {
    fn new(name: String, probe: SharedProbe, options: TargetOptions) -> Self {
        Self {
            info: TargetInfo {
                name,
                importance: options.importance,
                icon: options.icon,
                group: options.group,
            },
            probe,
        }
    }

    pub fn info(&self) -> &TargetInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Run the probe once and capture its verdict; never fails
    async fn run(&self, ctx: &CheckContext) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = ctx.run(self.probe.check(ctx)).await;
        let duration = start.elapsed();

        match outcome {
            Ok(()) => {
                debug!(name = %self.info.name, ?duration, "target healthy");
                HealthCheckResult::ok(self.info.clone(), duration)
            }
            Err(err) => {
                warn!(
                    name = %self.info.name,
                    importance = ?self.info.importance,
                    error = %err,
                    cancelled = err.is_cancellation(),
                    "target check failed"
                );
                HealthCheckResult::fail(self.info.clone(), err.to_string(), duration)
            }
        }
    }
}

impl fmt::Debug for HealthTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthTarget")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Manages a collection of health check targets
#[derive(Debug, Clone, Default)]
pub struct HealthChecker {
    targets: Vec<HealthTarget>,
}

impl HealthChecker {
    /// Create an empty health checker
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`HealthChecker::register`]
    #[must_use]
    pub fn with_target(
        mut self,
        name: impl Into<String>,
        probe: SharedProbe,
        options: TargetOptions,
    ) -> Self {
        self.register(name, probe, options);
        self
    }

    /// Append a target. Names are display keys and are not required to be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        probe: SharedProbe,
        options: TargetOptions,
    ) -> &mut Self {
        let target = HealthTarget::new(name.into(), probe, options);
        debug!(name = %target.info.name, importance = ?target.info.importance, "registered health target");
        self.targets.push(target);
        self
    }

    /// Registered targets in registration order
    pub fn targets(&self) -> &[HealthTarget] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Check every target concurrently under `ctx`.
    ///
    /// Returns one result per target, in registration order. Cancelling `ctx`
    /// reaches every running probe at once; dropping the returned future
    /// cancels them as well.
    pub async fn evaluate(&self, ctx: &CheckContext) -> Result<Vec<HealthCheckResult>> {
        let scope = ctx.child();
        let _release = scope.cancel_on_drop();

        let mut slots: Vec<Option<HealthCheckResult>> = vec![None; self.targets.len()];
        let mut tasks = JoinSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            let target = target.clone();
            let ctx = scope.clone();
            tasks.spawn(async move { (index, target.run(&ctx).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|err| {
                error!(error = %err, "health check task failed");
                CoreError::EvaluationError(format!("health check task failed: {err}"))
            })?;
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CoreError::EvaluationError("health check result missing".to_string()))
    }
}
