//! Health checking and probing functionality
//!
//! This module provides the probe abstraction every health check implements,
//! the combinators that compose probes, and the background probes that serve
//! cached verdicts for checks too expensive to run on every request.
//!
//! ## Types
//!
//! - [`Probe`]: The main trait for health check implementations
//! - [`CheckContext`]: Cancellation and deadline handed to every probe
//! - [`probe_fn`]: Turn an async closure into a probe
//! - [`with_timeout`], [`with_retries`], [`with_config`], [`all`], [`any`],
//!   [`with_threshold`]: Combinators
//! - [`RefreshingProbe`]: Periodically refreshed, staleness-checked verdict
//! - [`RoundTripProbe`]: Broker ping loop with a freshness check
//! - [`TcpProbe`]: TCP connection-based health checking
//! - [`HealthError`]: Error types for health check failures

pub mod combinators;
pub mod context;
pub mod error;
pub mod ping;
pub mod refresh;
pub mod tcp;
pub mod types;

pub use combinators::{all, any, with_config, with_retries, with_threshold, with_timeout};
pub use context::CheckContext;
pub use error::HealthError;
pub use ping::{InMemoryPingStore, PingSettings, PingStore, Pinger, RoundTripProbe};
pub use refresh::{RefreshSettings, Refresher, RefreshingProbe};
pub use tcp::TcpProbe;
pub use types::{probe_fn, Probe, ProbeFn, SharedProbe};
