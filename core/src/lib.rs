//! Core functionality for vigil health checking
//!
//! This crate contains the probe abstraction and its combinators, the
//! background probes, and the checker that evaluates registered targets.
//! The HTTP boundary lives in the daemon crate.

pub mod checker;
pub mod config;
pub mod error;
pub mod health;


// Re-export schema types for convenience
pub use schema::*;

pub use checker::{HealthChecker, HealthTarget, TargetOptions};
pub use config::{load_config_from_toml_path, load_config_from_toml_str, VigilConfig};
pub use error::{CoreError, Result};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
