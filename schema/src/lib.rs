//! Schema definitions for vigil
//!
//! This crate contains the data structures shared by the health checker and
//! the HTTP boundary: per-target results, grouping for the status page, and the
//! configuration values consumed by probes and the daemon. All types here
//! implement JSON Schema generation for external consumption.

pub mod config;
pub mod health;
pub mod page;


pub use config::*;
pub use health::*;
pub use page::*;
