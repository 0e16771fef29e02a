//! Background-refresh probes
//!
//! Some checks are too slow, rate limited by the dependency, or need a
//! persistent connection, so they cannot run on every health request. A
//! [`RefreshingProbe`] runs such a check on a fixed timer in its own task and
//! answers [`Probe::check`] from the cached verdict, which costs one read lock.
//!
//! Lifecycle:
//!
//! ```text
//! start: validate → first refresh (inline) → spawn timer task
//! tick:  refresh under timeout → replace {last error, last checked}
//! check: caller done? → never refreshed? → stale? → cached verdict
//! close: cancel → wait for the task → close the resource
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CheckContext, HealthError, Probe};

/// Timeout applied to a refresh when none is configured
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// A cached verdict stays fresh for this many refresh intervals
pub const STALE_FACTOR: u32 = 2;

/// The expensive check behind a [`RefreshingProbe`]
#[async_trait]
pub trait Refresher: Send + Sync + 'static {
    /// Short name used in log lines and failure messages
    fn name(&self) -> &str;

    /// Reject invalid criteria before anything runs
    fn validate(&self) -> Result<(), HealthError> {
        Ok(())
    }

    /// Run the underlying check once
    async fn refresh(&self, ctx: &CheckContext) -> Result<(), HealthError>;

    /// Release the underlying resource. Called once, after the timer task stopped.
    async fn close(&self) -> Result<(), HealthError> {
        Ok(())
    }
}

/// Settings for a [`RefreshingProbe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Period of the refresh timer; must be positive
    pub interval: Duration,
    /// Bound on a single refresh; `None` or zero means [`DEFAULT_REFRESH_TIMEOUT`]
    pub timeout: Option<Duration>,
}

impl RefreshSettings {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective per-refresh timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_REFRESH_TIMEOUT)
    }

    /// Age after which a cached verdict is reported as stale
    pub fn stale_after(&self) -> Duration {
        self.interval.checked_mul(STALE_FACTOR).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    last_error: Option<HealthError>,
    last_checked: Option<Instant>,
}

struct Inner<R> {
    refresher: R,
    settings: RefreshSettings,
    refreshes: AtomicUsize,
    state: RwLock<RefreshState>,
}

impl<R: Refresher> Inner<R> {
    async fn refresh(&self, parent: &CheckContext) {
        let ctx = parent.with_timeout(self.settings.timeout());
        let _release = ctx.cancel_on_drop();

        let result = ctx.run(self.refresher.refresh(&ctx)).await;
        if parent.token().is_cancelled() {
            // Shutting down; keep the last real verdict
            return;
        }

        match &result {
            Ok(()) => debug!(probe = self.refresher.name(), "background refresh succeeded"),
            Err(err) => warn!(probe = self.refresher.name(), error = %err, "background refresh failed"),
        }

        let mut state = self.state.write().await;
        state.last_error = result.err();
        state.last_checked = Some(Instant::now());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Probe that serves a periodically refreshed, staleness-checked verdict
///
/// Exactly one background task writes the cached state; any number of
/// concurrent `check` calls read it. Call [`RefreshingProbe::close`] at
/// teardown; dropping the probe only cancels the task.
pub struct RefreshingProbe<R: Refresher> {
    inner: Arc<Inner<R>>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<R: Refresher> RefreshingProbe<R> {
    /// Validate, refresh once, then start the refresh timer.
    ///
    /// Returns only after the first refresh completed, so the probe is
    /// immediately queryable. Invalid settings are rejected before the
    /// refresher runs.
    pub async fn start(refresher: R, settings: RefreshSettings) -> Result<Self, HealthError> {
        if settings.interval.is_zero() {
            return Err(HealthError::Config("interval must be positive".to_string()));
        }
        refresher.validate()?;

        let inner = Arc::new(Inner {
            refresher,
            settings,
            refreshes: AtomicUsize::new(0),
            state: RwLock::new(RefreshState::default()),
        });

        let token = CancellationToken::new();
        let ctx = CheckContext::with_token(token.clone());
        inner.refresh(&ctx).await;

        info!(
            probe = inner.refresher.name(),
            interval = ?settings.interval,
            timeout = ?settings.timeout(),
            "background refresh started"
        );
        let task = tokio::spawn(refresh_loop(inner.clone(), ctx));

        Ok(Self {
            inner,
            token,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// The wrapped refresher
    pub fn refresher(&self) -> &R {
        &self.inner.refresher
    }

    pub fn settings(&self) -> RefreshSettings {
        self.inner.settings
    }

    /// Number of refreshes that have completed so far
    pub fn refresh_count(&self) -> usize {
        self.inner.refreshes.load(Ordering::Relaxed)
    }

    /// Stop the timer task, wait for it to exit, then close the refresher.
    ///
    /// No refresh starts after the task has been awaited. Repeated calls are
    /// harmless; the refresher is closed only once.
    pub async fn close(&self) -> Result<(), HealthError> {
        self.token.cancel();

        // Concurrent callers queue here until the first one has finished
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(err) = handle.await {
                warn!(probe = self.inner.refresher.name(), error = %err, "refresh task ended abnormally");
            }
        }

        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.inner.refresher.close().await;
        drop(task);
        result
    }
}

impl<R: Refresher> Drop for RefreshingProbe<R> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[async_trait]
impl<R: Refresher> Probe for RefreshingProbe<R> {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let (last_error, last_checked) = {
            let state = self.inner.state.read().await;
            (state.last_error.clone(), state.last_checked)
        };

        let name = self.inner.refresher.name();
        let Some(last_checked) = last_checked else {
            return Err(HealthError::NotInitialized(name.to_string()));
        };

        let age = last_checked.elapsed();
        let allowed = self.inner.settings.stale_after();
        if age > allowed {
            return Err(HealthError::Stale {
                name: name.to_string(),
                age,
                allowed,
            });
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn refresh_loop<R: Refresher>(inner: Arc<Inner<R>>, ctx: CheckContext) {
    let period = inner.settings.interval;
    let Some(first_tick) = Instant::now().checked_add(period) else {
        // The timer would never fire; the initial verdict is all there is
        ctx.token().cancelled().await;
        info!(probe = inner.refresher.name(), "background refresh stopped");
        return;
    };
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.token().cancelled() => break,
            _ = ticker.tick() => inner.refresh(&ctx).await,
        }
    }

    info!(probe = inner.refresher.name(), "background refresh stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone)]
    enum Mode {
        Healthy,
        Failing(&'static str),
        Hanging,
    }

    /// Stand-in for a container poller: criteria are labels, the state is scripted
    struct ScriptedRefresher {
        labels: Vec<String>,
        mode: Arc<StdMutex<Mode>>,
        calls: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        close_delay: Duration,
    }

    impl ScriptedRefresher {
        fn new(mode: Mode) -> Self {
            Self {
                labels: vec!["app=status".to_string()],
                mode: Arc::new(StdMutex::new(mode)),
                calls: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
                close_delay: Duration::ZERO,
            }
        }

        fn with_close_delay(mut self, delay: Duration) -> Self {
            self.close_delay = delay;
            self
        }

        fn set_mode(&self, mode: Mode) {
            *self.mode.lock().unwrap() = mode;
        }
    }

    #[async_trait]
    impl Refresher for ScriptedRefresher {
        fn name(&self) -> &str {
            "container check"
        }

        fn validate(&self) -> Result<(), HealthError> {
            if self.labels.is_empty() {
                return Err(HealthError::Config("labels must not be empty".to_string()));
            }
            Ok(())
        }

        async fn refresh(&self, _ctx: &CheckContext) -> Result<(), HealthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mode = self.mode.lock().unwrap().clone();
            match mode {
                Mode::Healthy => Ok(()),
                Mode::Failing(reason) => Err(HealthError::failed(reason)),
                Mode::Hanging => pending().await,
            }
        }

        async fn close(&self) -> Result<(), HealthError> {
            tokio::time::sleep(self.close_delay).await;
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings(interval_ms: u64) -> RefreshSettings {
        RefreshSettings::new(Duration::from_millis(interval_ms)).with_timeout(Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_refresh_happens_before_start_returns() {
        let probe = RefreshingProbe::start(ScriptedRefresher::new(Mode::Healthy), settings(20))
            .await
            .unwrap();

        assert_eq!(probe.refresher().calls.load(Ordering::SeqCst), 1);
        assert_eq!(probe.refresh_count(), 1);
        assert!(probe.check(&CheckContext::background()).await.is_ok());
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_error_is_returned_verbatim() {
        let refresher = ScriptedRefresher::new(Mode::Failing("container abc not running (state=exited)"));
        let probe = RefreshingProbe::start(refresher, settings(20)).await.unwrap();

        let err = probe.check(&CheckContext::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "container abc not running (state=exited)");
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_picks_up_changes_and_survives_failures() {
        let probe = RefreshingProbe::start(ScriptedRefresher::new(Mode::Healthy), settings(15))
            .await
            .unwrap();
        let ctx = CheckContext::background();
        assert!(probe.check(&ctx).await.is_ok());

        probe.refresher().set_mode(Mode::Failing("no containers found"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = probe.check(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "no containers found");

        probe.refresher().set_mode(Mode::Healthy);
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(probe.check(&ctx).await.is_ok());
        assert!(probe.refresh_count() >= 3);
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_goes_stale_after_two_intervals() {
        let probe = RefreshingProbe::start(ScriptedRefresher::new(Mode::Healthy), settings(10))
            .await
            .unwrap();
        let ctx = CheckContext::background();

        // Every refresh from now on hangs, so last_checked stays put
        probe.refresher().set_mode(Mode::Hanging);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(probe.check(&ctx).await.is_ok(), "one missed tick is tolerated");

        tokio::time::sleep(Duration::from_millis(10)).await;
        match probe.check(&ctx).await {
            Err(HealthError::Stale { allowed, .. }) => {
                assert_eq!(allowed, Duration::from_millis(20));
            }
            other => panic!("Expected HealthError::Stale, got {other:?}"),
        }
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_overrides_cached_failure() {
        let probe = RefreshingProbe::start(
            ScriptedRefresher::new(Mode::Failing("container down")),
            settings(10),
        )
        .await
        .unwrap();
        probe.refresher().set_mode(Mode::Hanging);

        tokio::time::sleep(Duration::from_millis(25)).await;
        let err = probe.check(&CheckContext::background()).await.unwrap_err();
        assert!(matches!(err, HealthError::Stale { .. }), "got {err:?}");
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timeout_becomes_cached_error() {
        let refresher = ScriptedRefresher::new(Mode::Hanging);
        let settings = RefreshSettings::new(Duration::from_secs(1)).with_timeout(Duration::from_millis(50));
        let probe = RefreshingProbe::start(refresher, settings).await.unwrap();

        let err = probe.check(&CheckContext::background()).await.unwrap_err();
        assert!(matches!(err, HealthError::DeadlineExceeded), "got {err:?}");
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_fails_immediately() {
        let probe = RefreshingProbe::start(ScriptedRefresher::new(Mode::Healthy), settings(20))
            .await
            .unwrap();
        let ctx = CheckContext::background();
        ctx.cancel();

        assert!(matches!(probe.check(&ctx).await, Err(HealthError::Cancelled)));
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_settings_rejected_before_any_refresh() {
        let refresher = ScriptedRefresher::new(Mode::Healthy);
        let calls = refresher.calls.clone();
        let result = RefreshingProbe::start(refresher, RefreshSettings::new(Duration::ZERO)).await;
        assert!(matches!(result, Err(HealthError::Config(_))));

        let mut refresher = ScriptedRefresher::new(Mode::Healthy);
        refresher.labels.clear();
        let result = RefreshingProbe::start(refresher, settings(20)).await;
        match result {
            Err(HealthError::Config(msg)) => assert_eq!(msg, "labels must not be empty"),
            Err(other) => panic!("Expected HealthError::Config, got {other:?}"),
            Ok(_) => panic!("Expected HealthError::Config, got a running probe"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_refreshing_and_closes_once() {
        let refresher = ScriptedRefresher::new(Mode::Healthy);
        let calls = refresher.calls.clone();
        let closes = refresher.closes.clone();
        let probe = RefreshingProbe::start(refresher, settings(10)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        probe.close().await.unwrap();
        let after_close = calls.load(Ordering::SeqCst);
        assert!(after_close >= 3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_close);

        probe.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_close_waits_for_refresher_close() {
        let refresher =
            ScriptedRefresher::new(Mode::Healthy).with_close_delay(Duration::from_millis(50));
        let closes = refresher.closes.clone();
        let probe = RefreshingProbe::start(refresher, settings(10)).await.unwrap();

        async fn close_and_count(probe: &RefreshingProbe<ScriptedRefresher>, closes: &AtomicUsize) -> usize {
            probe.close().await.unwrap();
            closes.load(Ordering::SeqCst)
        }
        let (first, second) = tokio::join!(
            close_and_count(&probe, &closes),
            close_and_count(&probe, &closes)
        );
        assert_eq!(first, 1);
        assert_eq!(second, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_interval_keeps_initial_verdict() {
        let settings = RefreshSettings::new(Duration::MAX);
        assert_eq!(settings.stale_after(), Duration::MAX);

        let probe = RefreshingProbe::start(ScriptedRefresher::new(Mode::Healthy), settings)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(probe.check(&CheckContext::background()).await.is_ok());
        assert_eq!(probe.refresh_count(), 1);
        probe.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_interrupts_in_flight_refresh() {
        let probe = RefreshingProbe::start(ScriptedRefresher::new(Mode::Healthy), settings(10))
            .await
            .unwrap();
        probe.refresher().set_mode(Mode::Hanging);
        tokio::time::sleep(Duration::from_millis(12)).await;

        probe.close().await.unwrap();
        assert_eq!(probe.refresh_count(), 1);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RefreshSettings::new(Duration::from_secs(30));
        assert_eq!(settings.timeout(), DEFAULT_REFRESH_TIMEOUT);
        assert_eq!(settings.stale_after(), Duration::from_secs(60));
        assert_eq!(
            settings.with_timeout(Duration::ZERO).timeout(),
            DEFAULT_REFRESH_TIMEOUT
        );
        assert_eq!(
            settings.with_timeout(Duration::from_secs(2)).timeout(),
            Duration::from_secs(2)
        );
    }
}
