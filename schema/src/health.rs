//! Per-target health check results and the pure functions that reduce them

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How much a target matters for the aggregate verdict
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TargetImportance {
    /// Failures are reported but never fail the aggregate
    Low,
    /// Any failure fails the aggregate
    #[default]
    High,
}

/// Verdict for a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Ok,
    Fail,
}

/// Display metadata of a registered target, without its probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetInfo {
    /// Name used as the display key
    pub name: String,
    /// Importance used during aggregation
    #[serde(default)]
    pub importance: TargetImportance,
    /// Optional icon CSS class name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Optional group name; targets sharing a group are displayed together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl TargetInfo {
    /// Create target info with high importance and no icon or group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            importance: TargetImportance::High,
            icon: None,
            group: None,
        }
    }

    /// Group name if one is set and non-empty
    pub fn group_name(&self) -> Option<&str> {
        self.group.as_deref().filter(|g| !g.is_empty())
    }
}

/// Result of checking one target during one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthCheckResult {
    pub target: TargetInfo,
    pub status: TargetStatus,
    /// Failure reason, present only when `status` is `fail`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Elapsed time of the probe, serialized as nanoseconds
    #[serde(default, with = "duration_nanos")]
    #[schemars(with = "u64")]
    pub duration: Duration,
}

impl HealthCheckResult {
    /// A successful result
    pub fn ok(target: TargetInfo, duration: Duration) -> Self {
        Self {
            target,
            status: TargetStatus::Ok,
            error: None,
            duration,
        }
    }

    /// A failed result carrying the probe's failure message
    pub fn fail(target: TargetInfo, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            target,
            status: TargetStatus::Fail,
            error: Some(error.into()),
            duration,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TargetStatus::Ok
    }
}

/// Aggregate verdict: false iff at least one high importance target failed.
///
/// Low importance failures never flip the aggregate.
pub fn is_healthy(results: &[HealthCheckResult]) -> bool {
    !results
        .iter()
        .any(|r| r.target.importance == TargetImportance::High && !r.is_ok())
}

/// Results that share a group name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthGroup {
    pub name: String,
    pub results: Vec<HealthCheckResult>,
}

/// Partition results by non-empty group name.
///
/// Groups come back sorted by name; within a group results keep their
/// original relative order. Ungrouped results are left out, see
/// [`ungrouped_results`].
pub fn group_results(results: &[HealthCheckResult]) -> Vec<HealthGroup> {
    let mut groups: BTreeMap<&str, Vec<HealthCheckResult>> = BTreeMap::new();
    for result in results {
        if let Some(name) = result.target.group_name() {
            groups.entry(name).or_default().push(result.clone());
        }
    }

    groups
        .into_iter()
        .map(|(name, results)| HealthGroup {
            name: name.to_string(),
            results,
        })
        .collect()
}

/// Results without a group, in their original order
pub fn ungrouped_results(results: &[HealthCheckResult]) -> Vec<HealthCheckResult> {
    results
        .iter()
        .filter(|r| r.target.group_name().is_none())
        .cloned()
        .collect()
}

mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
