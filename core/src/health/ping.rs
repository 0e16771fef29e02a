//! Round-trip ping probes for message brokers
//!
//! A producer task publishes a timestamped ping every `stale_after / 2` and a
//! consumer task records the timestamp of every ping that comes back in a
//! [`PingStore`]. `check` only reads the store: the dependency is healthy while
//! the most recent round trip is younger than `stale_after`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CheckContext, HealthError, Probe};

/// Lower bound on the ping period unless configured otherwise
pub const DEFAULT_MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Persists timestamps of processed ping messages
#[async_trait]
pub trait PingStore: Send + Sync + 'static {
    /// Store the timestamp of a processed ping
    async fn set_processed(&self, at: DateTime<Utc>) -> Result<(), HealthError>;

    /// Timestamp of the most recently processed ping, if any
    async fn last_processed(&self) -> Result<Option<DateTime<Utc>>, HealthError>;
}

/// Keeps the latest ping timestamp in memory
#[derive(Debug, Default)]
pub struct InMemoryPingStore {
    last: RwLock<Option<DateTime<Utc>>>,
}

impl InMemoryPingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PingStore for InMemoryPingStore {
    async fn set_processed(&self, at: DateTime<Utc>) -> Result<(), HealthError> {
        *self.last.write().await = Some(at);
        Ok(())
    }

    async fn last_processed(&self) -> Result<Option<DateTime<Utc>>, HealthError> {
        Ok(*self.last.read().await)
    }
}

/// Transport that carries pings through the dependency and back
#[async_trait]
pub trait Pinger: Send + Sync + 'static {
    /// Short name used in log lines and failure messages
    fn name(&self) -> &str {
        "ping"
    }

    /// Publish one ping stamped with `sent_at`
    async fn send(&self, ctx: &CheckContext, sent_at: DateTime<Utc>) -> Result<(), HealthError>;

    /// Wait for the next ping to come back and return the timestamp it carried
    async fn receive(&self, ctx: &CheckContext) -> Result<DateTime<Utc>, HealthError>;

    /// Release producer and consumer connections. Called once, after both tasks stopped.
    async fn close(&self) -> Result<(), HealthError> {
        Ok(())
    }
}

/// Settings for a [`RoundTripProbe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingSettings {
    /// Maximum age of the last round trip; must be positive
    pub stale_after: Duration,
    /// Floor for the ping period
    pub min_interval: Duration,
}

impl PingSettings {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            min_interval: DEFAULT_MIN_PING_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Pings go out at half the staleness window, but never faster than `min_interval`
    pub fn ping_interval(&self) -> Duration {
        (self.stale_after / 2).max(self.min_interval)
    }
}

struct Shared<P, S> {
    pinger: P,
    store: S,
    settings: PingSettings,
}

/// Probe fed by a continuous produce/consume ping loop
///
/// Unlike [`super::RefreshingProbe`] nothing runs inline at start, so `check`
/// fails until the first ping has made it back.
pub struct RoundTripProbe<P: Pinger, S: PingStore = InMemoryPingStore> {
    shared: Arc<Shared<P, S>>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<P: Pinger> RoundTripProbe<P, InMemoryPingStore> {
    /// Start with an in-memory store
    pub fn start(pinger: P, settings: PingSettings) -> Result<Self, HealthError> {
        Self::start_with_store(pinger, InMemoryPingStore::new(), settings)
    }
}

impl<P: Pinger, S: PingStore> RoundTripProbe<P, S> {
    /// Start the producer and consumer tasks
    pub fn start_with_store(pinger: P, store: S, settings: PingSettings) -> Result<Self, HealthError> {
        if settings.stale_after.is_zero() {
            return Err(HealthError::Config("stale_after must be positive".to_string()));
        }
        if settings.min_interval.is_zero() {
            return Err(HealthError::Config("min_interval must be positive".to_string()));
        }

        let shared = Arc::new(Shared {
            pinger,
            store,
            settings,
        });
        let token = CancellationToken::new();
        let ctx = CheckContext::with_token(token.clone());

        let tasks = vec![
            tokio::spawn(produce_loop(shared.clone(), ctx.clone())),
            tokio::spawn(consume_loop(shared.clone(), ctx)),
        ];
        info!(
            probe = shared.pinger.name(),
            stale_after = ?settings.stale_after,
            ping_interval = ?settings.ping_interval(),
            "round-trip ping started"
        );

        Ok(Self {
            shared,
            token,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    pub fn pinger(&self) -> &P {
        &self.shared.pinger
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// Stop both tasks, wait for them, then close the transport once
    pub async fn close(&self) -> Result<(), HealthError> {
        self.token.cancel();

        // Concurrent callers queue here until the first one has finished
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(probe = self.shared.pinger.name(), error = %err, "ping task ended abnormally");
            }
        }

        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.shared.pinger.close().await;
        drop(tasks);
        result
    }
}

impl<P: Pinger, S: PingStore> Drop for RoundTripProbe<P, S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[async_trait]
impl<P: Pinger, S: PingStore> Probe for RoundTripProbe<P, S> {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let name = self.shared.pinger.name();
        let last = self
            .shared
            .store
            .last_processed()
            .await?
            .ok_or_else(|| HealthError::NotInitialized(name.to_string()))?;

        // A timestamp from the future (clock skew) counts as fresh
        let age = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
        let allowed = self.shared.settings.stale_after;
        if age > allowed {
            return Err(HealthError::Stale {
                name: name.to_string(),
                age,
                allowed,
            });
        }

        Ok(())
    }
}

async fn produce_loop<P: Pinger, S: PingStore>(shared: Arc<Shared<P, S>>, ctx: CheckContext) {
    let period = shared.settings.ping_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.token().cancelled() => break,
            _ = ticker.tick() => {
                let sent_at = Utc::now();
                // A send may not outlive the slot before the next ping
                let send_ctx = ctx.with_timeout(period);
                let _release = send_ctx.cancel_on_drop();
                if let Err(err) = send_ctx.run(shared.pinger.send(&send_ctx, sent_at)).await {
                    if ctx.token().is_cancelled() {
                        break;
                    }
                    error!(probe = shared.pinger.name(), error = %err, "failed to send ping");
                }
            }
        }
    }
    debug!(probe = shared.pinger.name(), "ping producer stopped");
}

async fn consume_loop<P: Pinger, S: PingStore>(shared: Arc<Shared<P, S>>, ctx: CheckContext) {
    loop {
        let received = tokio::select! {
            _ = ctx.token().cancelled() => break,
            received = shared.pinger.receive(&ctx) => received,
        };

        match received {
            Ok(at) => {
                if let Err(err) = shared.store.set_processed(at).await {
                    error!(probe = shared.pinger.name(), error = %err, "failed to record ping");
                }
            }
            Err(err) => {
                error!(probe = shared.pinger.name(), error = %err, "failed to receive ping");
                // Back off so a broken transport does not spin
                if ctx.sleep(shared.settings.min_interval).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!(probe = shared.pinger.name(), "ping consumer stopped");
}
