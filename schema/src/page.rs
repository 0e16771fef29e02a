//! Data handed to the status page

use crate::health::{group_results, ungrouped_results, HealthCheckResult, HealthGroup};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Navigation link shown on the status page
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub url: String,
}

impl Link {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Everything the status page needs to render one view
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// RFC3339 timestamp of the evaluation
    pub checked_at: String,
    /// Results that carry no group, in registration order
    pub health_results: Vec<HealthCheckResult>,
    /// Grouped results, sorted by group name
    pub health_groups: Vec<HealthGroup>,
    pub links: Vec<Link>,
}

impl PageData {
    /// Build page data from one evaluation's results
    pub fn from_results(
        title: impl Into<String>,
        version: Option<String>,
        results: &[HealthCheckResult],
        links: Vec<Link>,
    ) -> Self {
        Self {
            title: title.into(),
            version,
            checked_at: chrono::Utc::now().to_rfc3339(),
            health_results: ungrouped_results(results),
            health_groups: group_results(results),
            links,
        }
    }
}
