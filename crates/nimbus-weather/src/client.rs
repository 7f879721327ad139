// crates/nimbus-weather/src/client.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use nimbus_core::WeatherError;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::cache::{normalize_key, WeatherCache};
use crate::config::SdkConfig;
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::provider::{Fetcher, OpenWeatherFetcher};
use crate::retry::{FetchPipeline, RetryPolicy};
use crate::scheduler::{RefreshContext, RefreshScheduler};
use crate::types::WeatherData;

/// Result of one upstream fetch, shared by every caller waiting on the same key
type InFlight = Arc<OnceCell<Result<WeatherData, WeatherError>>>;

/// Cached, retrying weather client.
///
/// `get_weather` serves fresh cache entries directly and otherwise runs the
/// fetch pipeline, storing the result. Concurrent misses for the same city
/// share one upstream request. In polling mode a background task keeps every
/// cached city up to date.
///
/// Call [`WeatherClient::shutdown`] when done; afterwards every operation
/// fails with `IllegalState`.
pub struct WeatherClient {
    config: SdkConfig,
    cache: Arc<WeatherCache>,
    pipeline: FetchPipeline,
    metrics: Arc<MetricsRecorder>,
    scheduler: Option<RefreshScheduler>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    closed: AtomicBool,
    /// Fired on shutdown to interrupt fetches still retrying.
    cancel: CancellationToken,
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("config", &self.config)
            .field("cached", &self.cache.size())
            .field("polling", &self.is_polling())
            .field("closed", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl WeatherClient {
    /// Create a client backed by the OpenWeather HTTP API.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built, or in polling mode when no
    /// tokio runtime is running.
    pub fn new(config: SdkConfig) -> Result<Self, WeatherError> {
        let fetcher = OpenWeatherFetcher::new(&config)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Create a client around a custom `Fetcher`.
    ///
    /// # Errors
    /// `IllegalState` in polling mode when no tokio runtime is running.
    pub fn with_fetcher(config: SdkConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, WeatherError> {
        let cache = Arc::new(WeatherCache::new(config.cache_size(), config.cache_ttl())?);
        let pipeline = FetchPipeline::new(fetcher, RetryPolicy::from_config(&config));
        let metrics = Arc::new(MetricsRecorder::new());

        let scheduler = if config.refresh_enabled() {
            let ctx = RefreshContext {
                cache: Arc::clone(&cache),
                pipeline: pipeline.clone(),
                metrics: Arc::clone(&metrics),
                api_key: config.api_key().to_string(),
            };
            Some(RefreshScheduler::start(config.polling_interval(), ctx)?)
        } else {
            None
        };

        tracing::info!(
            "Weather client created (mode: {:?}, cache size: {}, ttl: {:?})",
            config.mode(),
            config.cache_size(),
            config.cache_ttl()
        );

        Ok(Self {
            config,
            cache,
            pipeline,
            metrics,
            scheduler,
            in_flight: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the background refresh task is alive
    pub fn is_polling(&self) -> bool {
        self.scheduler.as_ref().is_some_and(RefreshScheduler::is_running)
    }

    /// Normalized names of the cities currently cached, least recently used first
    pub fn cached_cities(&self) -> Vec<String> {
        self.cache.keys()
    }

    /// Current weather for `city`, from cache when fresh.
    ///
    /// # Errors
    /// Any fetch error unchanged, or `IllegalState` after shutdown.
    pub async fn get_weather(&self, city: &str) -> Result<WeatherData, WeatherError> {
        self.get_or_fetch(city, &self.cancel).await
    }

    /// Like [`get_weather`](Self::get_weather), but returns `Interrupted` as
    /// soon as `cancel` fires.
    ///
    /// # Errors
    /// See `get_weather`.
    pub async fn get_weather_cancellable(
        &self,
        city: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherData, WeatherError> {
        // Fires on either shutdown or the caller's token.
        let scoped = self.cancel.child_token();
        let fetch = self.get_or_fetch(city, &scoped);
        tokio::pin!(fetch);

        tokio::select! {
            biased;
            result = &mut fetch => return result,
            _ = cancel.cancelled() => scoped.cancel(),
        }
        fetch.await
    }

    /// # Errors
    /// `IllegalState` after shutdown.
    pub fn metrics(&self) -> Result<MetricsSnapshot, WeatherError> {
        self.ensure_open()?;
        Ok(self.metrics.snapshot())
    }

    /// Stop background refresh, interrupt pending fetches and drop the cache.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
        self.cache.clear();
        self.in_flight.lock().clear();

        tracing::info!("Weather client shut down");
    }

    fn ensure_open(&self) -> Result<(), WeatherError> {
        if self.is_shutdown() {
            return Err(WeatherError::IllegalState(
                "Weather client has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    async fn get_or_fetch(
        &self,
        city: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherData, WeatherError> {
        self.ensure_open()?;
        let key = normalize_key(city)?;
        let started = Instant::now();

        if let Some(data) = self.cache.get(&key)? {
            tracing::debug!("Cache hit for {}", key);
            self.metrics.record_cache_hit();
            self.metrics.record_outcome(true, started.elapsed());
            return Ok(data);
        }

        tracing::debug!("Cache miss for {}", key);
        self.metrics.record_cache_miss();

        let result = self.fetch_shared(&key, cancel).await;
        self.metrics.record_outcome(result.is_ok(), started.elapsed());
        result
    }

    /// Join the in-flight fetch for `key`, starting one if none is pending.
    ///
    /// A fetch interrupted by its own caller's token is not shared: the cell
    /// stays empty and the next waiter runs the fetch itself. Shutdown
    /// interrupts are stored and seen by every waiter.
    async fn fetch_shared(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherData, WeatherError> {
        let cell = Arc::clone(self.in_flight.lock().entry(key.to_string()).or_default());

        let outcome = cell
            .get_or_try_init(|| async {
                let result = self
                    .pipeline
                    .fetch(key, self.config.api_key(), cancel)
                    .await
                    .and_then(|data| {
                        self.cache
                            .put(key, data.clone())
                            .map(|()| data)
                            .map_err(WeatherError::from)
                    });
                match result {
                    Err(WeatherError::Interrupted) if !self.cancel.is_cancelled() => {
                        Err(WeatherError::Interrupted)
                    }
                    other => Ok(other),
                }
            })
            .await;
        let result = match outcome {
            Ok(shared) => shared.clone(),
            Err(e) => Err(e),
        };

        // Leave the entry while another waiter may still be initializing it.
        let mut in_flight = self.in_flight.lock();
        let finished = cell.initialized() || Arc::strong_count(&cell) <= 2;
        if finished && in_flight.get(key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            in_flight.remove(key);
        }

        result
    }
}

impl Drop for WeatherClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
