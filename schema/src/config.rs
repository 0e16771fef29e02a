//! Configuration values shared by probes and the daemon

use crate::page::Link;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Common configuration for health checks
///
/// Each value is independently overridable; missing fields fall back to the
/// defaults (timeout 5s, 3 attempts, 1s between attempts).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckConfig {
    /// Timeout for a single attempt in milliseconds
    #[serde(default = "default_check_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of attempts before a check is reported as failed
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl CheckConfig {
    /// Get the timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Override the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Override the number of attempts
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Override the delay between attempts
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = duration_to_millis(delay);
        self
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_check_timeout_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_check_timeout_ms() -> u64 {
    5_000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Daemon configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Host to bind the daemon to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the daemon to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level for the daemon
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional deadline applied to each health evaluation, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Title of the status page
    #[serde(default = "default_title")]
    pub title: String,
    /// Whether the status page reports the build version
    #[serde(default = "default_show_version")]
    pub show_version: bool,
    /// Navigation links listed on the status page
    #[serde(default)]
    pub links: Vec<Link>,
}

impl DaemonConfig {
    /// Get the request timeout as a Duration
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            request_timeout_ms: None,
            title: default_title(),
            show_version: default_show_version(),
            links: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_title() -> String {
    "System Status".to_string()
}

fn default_show_version() -> bool {
    true
}
