//! Configuration loading and validation
//!
//! This module parses a TOML document into a [`VigilConfig`], applies
//! defaults (via serde defaults on schema types), and performs strict
//! validation with field-path error messages.
//!
//! ```toml
//! [daemon]
//! port = 9000
//! requestTimeoutMs = 2000
//!
//! [checks]
//! timeoutMs = 1500
//! retries = 2
//! ```

use crate::{CoreError, Result};
use schema::{CheckConfig, DaemonConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Top-level TOML structure
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VigilConfig {
    /// HTTP boundary settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Defaults applied to probes built from configuration
    #[serde(default)]
    pub checks: CheckConfig,
}

impl VigilConfig {
    /// Validate the configuration and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        let d = &self.daemon;
        if d.host.trim().is_empty() {
            return Err(invalid("daemon.host: cannot be empty"));
        }
        if d.log_level.trim().is_empty() {
            return Err(invalid("daemon.logLevel: cannot be empty"));
        }
        if d.request_timeout_ms == Some(0) {
            return Err(invalid("daemon.requestTimeoutMs: must be > 0"));
        }
        if d.title.trim().is_empty() {
            return Err(invalid("daemon.title: cannot be empty"));
        }
        for (i, link) in d.links.iter().enumerate() {
            if link.name.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "daemon.links[{}].name: cannot be empty",
                    i
                )));
            }
            if link.url.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "daemon.links[{}].url: cannot be empty",
                    i
                )));
            }
        }

        let c = &self.checks;
        if c.timeout_ms == 0 {
            return Err(invalid("checks.timeoutMs: must be > 0"));
        }
        if c.retries == 0 {
            return Err(invalid("checks.retries: must be > 0"));
        }

        debug!("configuration validated successfully");
        Ok(())
    }
}

fn invalid(message: &str) -> CoreError {
    CoreError::ValidationError(message.to_string())
}

/// Load configuration from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<VigilConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load configuration from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<VigilConfig> {
    let cfg: VigilConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = load_config_from_toml_str("").expect("should parse");
        assert_eq!(cfg, VigilConfig::default());
        assert_eq!(cfg.checks.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.checks.retries, 3);
        assert_eq!(cfg.checks.retry_delay(), Duration::from_secs(1));
        assert_eq!(cfg.daemon.title, "System Status");
        assert!(cfg.daemon.show_version);
        assert_eq!(cfg.daemon.request_timeout(), None);
    }

    #[test]
    fn parses_overrides() {
        let input = r#"
        [daemon]
        host = "0.0.0.0"
        port = 9000
        requestTimeoutMs = 2000
        title = "Payments"
        showVersion = false

        [[daemon.links]]
        name = "Runbook"
        url = "https://example.com/runbook"

        [checks]
        timeoutMs = 1500
        retries = 2
        "#;
        let cfg = load_config_from_toml_str(input).expect("should parse");
        assert_eq!(cfg.daemon.host, "0.0.0.0");
        assert_eq!(cfg.daemon.port, 9000);
        assert_eq!(cfg.daemon.request_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(cfg.daemon.title, "Payments");
        assert!(!cfg.daemon.show_version);
        assert_eq!(cfg.daemon.links.len(), 1);
        assert_eq!(cfg.daemon.links[0].name, "Runbook");
        assert_eq!(cfg.checks.timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.checks.retries, 2);
        // Unset field keeps its default
        assert_eq!(cfg.checks.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn errors_on_zero_timeout() {
        let err = load_config_from_toml_str("[checks]\ntimeoutMs = 0").unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(format!("{}", err).contains("checks.timeoutMs: must be > 0"));
    }

    #[test]
    fn errors_on_zero_retries() {
        let err = load_config_from_toml_str("[checks]\nretries = 0").unwrap_err();
        assert!(format!("{}", err).contains("checks.retries: must be > 0"));
    }

    #[test]
    fn errors_on_zero_request_timeout() {
        let err = load_config_from_toml_str("[daemon]\nrequestTimeoutMs = 0").unwrap_err();
        assert!(format!("{}", err).contains("daemon.requestTimeoutMs: must be > 0"));
    }

    #[test]
    fn errors_on_empty_host() {
        let err = load_config_from_toml_str("[daemon]\nhost = \" \"").unwrap_err();
        assert!(format!("{}", err).contains("daemon.host: cannot be empty"));
    }

    #[test]
    fn errors_on_link_without_url() {
        let input = r#"
        [[daemon.links]]
        name = "Docs"
        url = ""
        "#;
        let err = load_config_from_toml_str(input).unwrap_err();
        assert!(format!("{}", err).contains("daemon.links[0].url: cannot be empty"));
    }

    #[test]
    fn errors_on_unknown_section() {
        let err = load_config_from_toml_str("[services]\nweb = 1").unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationError(_)));
        assert_eq!(err.code(), "CORE001");
    }

    #[test]
    fn errors_on_malformed_toml() {
        let err = load_config_from_toml_str("[checks\ntimeoutMs = 1").unwrap_err();
        assert!(format!("{}", err).contains("TOML parse error"));
    }

    #[test]
    fn loads_from_path() {
        let path = std::env::temp_dir().join(format!("vigil-config-{}.toml", std::process::id()));
        fs::write(&path, "[daemon]\nport = 7070\n").unwrap();
        let cfg = load_config_from_toml_path(&path).unwrap();
        assert_eq!(cfg.daemon.port, 7070);
        let _ = fs::remove_file(&path);

        let err = load_config_from_toml_path(&path).unwrap_err();
        assert!(format!("{}", err).contains("Failed to read config"));
    }
}
