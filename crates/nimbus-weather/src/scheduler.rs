//! Background refresh of every cached city.
//!
//! One tokio task ticks at a fixed period (first cycle immediately) and, for
//! a snapshot of the resident keys, re-runs the fetch pipeline one key at a
//! time and writes fresh results back into the cache. Failures are logged and
//! counted, never propagated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nimbus_core::WeatherError;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::WeatherCache;
use crate::metrics::MetricsRecorder;
use crate::retry::FetchPipeline;

/// How long `shutdown` waits for an in-flight cycle before interrupting it,
/// and again before aborting the task.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything a refresh cycle touches
#[derive(Debug, Clone)]
pub struct RefreshContext {
    pub cache: Arc<WeatherCache>,
    pub pipeline: FetchPipeline,
    pub metrics: Arc<MetricsRecorder>,
    pub api_key: String,
}

#[derive(Debug)]
pub struct RefreshScheduler {
    period: Duration,
    /// Ends the loop at the next key or tick boundary.
    stop: CancellationToken,
    /// Interrupts the fetch currently in flight.
    abort: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Spawn the refresh loop on the current tokio runtime.
    ///
    /// # Errors
    /// `IllegalState` when called outside a tokio runtime.
    pub fn start(period: Duration, ctx: RefreshContext) -> Result<Self, WeatherError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            WeatherError::IllegalState("Polling mode requires a running tokio runtime".to_string())
        })?;

        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let handle = runtime.spawn(run(period, ctx, stop.clone(), abort.clone()));

        tracing::info!("Refresh scheduler started with period {:?}", period);
        Ok(Self {
            period,
            stop,
            abort,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop. An in-flight cycle gets `SHUTDOWN_GRACE` to finish, then
    /// its fetch is interrupted; a task still running after a second grace
    /// period is aborted. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown_with_grace(SHUTDOWN_GRACE).await;
    }

    pub(crate) async fn shutdown_with_grace(&self, grace: Duration) {
        self.stop.cancel();

        let Some(mut handle) = self.handle.lock().take() else {
            return;
        };

        if tokio::time::timeout(grace, &mut handle).await.is_ok() {
            tracing::info!("Refresh scheduler stopped");
            return;
        }

        tracing::warn!("Refresh cycle still running after {:?}, interrupting", grace);
        self.abort.cancel();
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            tracing::warn!("Refresh scheduler did not terminate, aborting task");
            handle.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop.cancel();
        self.abort.cancel();
    }
}

async fn run(
    period: Duration,
    ctx: RefreshContext,
    stop: CancellationToken,
    abort: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A panicking cycle surfaces as a JoinError here; the loop carries on.
        let started = Instant::now();
        let cycle = tokio::spawn(refresh_cycle(ctx.clone(), stop.clone(), abort.clone()));
        if let Err(e) = cycle.await {
            tracing::error!("Unexpected error during refresh cycle: {}", e);
            ctx.metrics.record_outcome(false, started.elapsed());
        }
    }

    tracing::debug!("Refresh loop exited");
}

async fn refresh_cycle(ctx: RefreshContext, stop: CancellationToken, abort: CancellationToken) {
    let cities = ctx.cache.keys();
    if cities.is_empty() {
        return;
    }
    tracing::debug!("Refreshing {} cached cities", cities.len());

    let mut refreshed = 0usize;
    for city in &cities {
        if stop.is_cancelled() {
            tracing::debug!("Refresh cycle stopped before {}", city);
            break;
        }

        let started = Instant::now();
        match refresh_one(&ctx, city, &abort).await {
            Ok(()) => {
                refreshed += 1;
                ctx.metrics.record_outcome(true, started.elapsed());
            }
            Err(WeatherError::Interrupted) => {
                tracing::debug!("Refresh of {} interrupted", city);
                ctx.metrics.record_outcome(false, started.elapsed());
                break;
            }
            Err(e) => {
                tracing::warn!("Failed to refresh weather for {}: {}", city, e);
                ctx.metrics.record_outcome(false, started.elapsed());
            }
        }
    }

    tracing::info!("Refresh cycle updated {} of {} cities", refreshed, cities.len());
}

async fn refresh_one(
    ctx: &RefreshContext,
    city: &str,
    abort: &CancellationToken,
) -> Result<(), WeatherError> {
    let data = ctx.pipeline.fetch(city, &ctx.api_key, abort).await?;
    ctx.cache.put(city, data)?;
    Ok(())
}
