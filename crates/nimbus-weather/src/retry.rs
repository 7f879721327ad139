//! Bounded, fixed-delay retry around a single `Fetcher` call.
//!
//! Retried:
//! - Connection failures and timeouts
//! - 5xx server errors
//!
//! Surfaced on first occurrence:
//! - Invalid arguments, 401, 404, 429
//! - Unexpected statuses and undecodable bodies
//!
//! Cancellation is observed both while a request is in flight and while
//! waiting between attempts. The token is never reset, so callers can still
//! see that it fired after `Interrupted` comes back.

use std::sync::Arc;
use std::time::Duration;

use nimbus_core::{NetworkErrorKind, WeatherError};
use tokio_util::sync::CancellationToken;

use crate::config::{SdkConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::provider::Fetcher;
use crate::types::WeatherData;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first. Never less than 1.
    pub max_attempts: u32,
    /// Fixed wait between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self::new(config.max_attempts(), config.retry_delay())
    }
}

/// Outcome of one attempt, deciding whether the pipeline loops again
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Success(T),
    Fatal(WeatherError),
    Retryable(WeatherError),
}

impl<T> From<Result<T, WeatherError>> for Attempt<T> {
    fn from(result: Result<T, WeatherError>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_retryable() => Attempt::Retryable(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// Validating, retrying, cancellable wrapper around a `Fetcher`
#[derive(Clone)]
pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for FetchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPipeline")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl FetchPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch current weather for `city`, retrying transient failures.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank city or key, before any I/O
    /// - `Unauthorized`, `NotFound`, `RateLimited` as soon as they occur
    /// - `Network` with `attempts == max_attempts` once the budget is spent
    /// - `Interrupted` if `cancel` fires
    pub async fn fetch(
        &self,
        city: &str,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<WeatherData, WeatherError> {
        if city.trim().is_empty() {
            return Err(WeatherError::invalid_argument("City name must not be empty"));
        }
        if api_key.trim().is_empty() {
            return Err(WeatherError::invalid_argument("API key must not be empty"));
        }

        let max_attempts = self.policy.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tracing::info!(
                    "Retry attempt {} of {}, waiting {:?}",
                    attempt,
                    max_attempts,
                    self.policy.delay
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Fetch for {} interrupted during retry delay", city);
                        return Err(WeatherError::Interrupted);
                    }
                    _ = tokio::time::sleep(self.policy.delay) => {}
                }
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Fetch for {} interrupted", city);
                    return Err(WeatherError::Interrupted);
                }
                result = self.fetcher.fetch(city, api_key) => result,
            };

            match Attempt::from(result) {
                Attempt::Success(data) => {
                    if attempt > 1 {
                        tracing::info!("Fetch for {} succeeded after {} attempts", city, attempt);
                    }
                    return Ok(data);
                }
                Attempt::Fatal(e) => {
                    tracing::debug!("Non-retryable error for {}: {}", city, e);
                    return Err(e);
                }
                Attempt::Retryable(e) => {
                    tracing::warn!(
                        "Retryable error on attempt {} of {}: {}",
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        tracing::error!("All {} attempts exhausted for {}", max_attempts, city);
        Err(exhausted(max_attempts, last_error))
    }
}

/// Wrap the last transient failure into the terminal error, keeping its class.
fn exhausted(attempts: u32, last: Option<WeatherError>) -> WeatherError {
    let (kind, status, cause) = match last {
        Some(WeatherError::Network {
            kind,
            status,
            message,
            ..
        }) => (kind, status, message),
        Some(other) => (NetworkErrorKind::Connection, other.http_status(), other.to_string()),
        None => (NetworkErrorKind::Connection, None, "no attempt was made".to_string()),
    };

    WeatherError::Network {
        kind,
        status,
        attempts,
        message: format!(
            "Failed to fetch weather data after {} attempts. Original error: {}",
            attempts, cause
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::testing::{transient, ScriptedFetcher};

    fn pipeline(fetcher: &Arc<ScriptedFetcher>, max_attempts: u32) -> FetchPipeline {
        FetchPipeline::new(
            fetcher.clone(),
            RetryPolicy::new(max_attempts, Duration::from_millis(500)),
        )
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_attempt_classification() {
        let ok: Attempt<u8> = Ok(1).into();
        assert_eq!(ok, Attempt::Success(1));

        let server = WeatherError::network(NetworkErrorKind::Server, Some(503), "down");
        assert!(matches!(Attempt::<u8>::from(Err(server)), Attempt::Retryable(_)));
        assert!(matches!(Attempt::<u8>::from(Err(transient())), Attempt::Retryable(_)));

        let fatal = [
            WeatherError::Unauthorized("bad key".into()),
            WeatherError::NotFound("City not found: x".into()),
            WeatherError::RateLimited { retry_after_secs: 5 },
            WeatherError::network(NetworkErrorKind::InvalidResponse, Some(200), "garbage"),
            WeatherError::network(NetworkErrorKind::UnexpectedStatus, Some(400), "bad"),
        ];
        for err in fatal {
            assert!(matches!(Attempt::<u8>::from(Err(err)), Attempt::Fatal(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push(Err(transient())).push(Err(transient()));

        let data = pipeline(&fetcher, 3)
            .fetch("London", "key", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(data.name, "London");
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_fixed_delay_between_attempts() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push(Err(transient())).push(Err(transient()));

        let start = tokio::time::Instant::now();
        pipeline(&fetcher, 3)
            .fetch("London", "key", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push(Err(WeatherError::Unauthorized("Invalid or missing API key".into())));

        let err = pipeline(&fetcher, 3)
            .fetch("London", "bad", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Unauthorized(_)));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push(Err(WeatherError::RateLimited { retry_after_secs: 30 }));

        let err = pipeline(&fetcher, 3)
            .fetch("London", "key", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, WeatherError::RateLimited { retry_after_secs: 30 });
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempt_count() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.fail_city("london", transient());

        let err = pipeline(&fetcher, 3)
            .fetch("London", "key", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(fetcher.calls(), 3);
        match err {
            WeatherError::Network {
                kind,
                attempts,
                ref message,
                ..
            } => {
                assert_eq!(kind, NetworkErrorKind::Connection);
                assert_eq!(attempts, 3);
                assert!(message.contains('3'));
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_keeps_server_status() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.fail_city(
            "paris",
            WeatherError::network(NetworkErrorKind::Server, Some(502), "bad gateway"),
        );

        let err = pipeline(&fetcher, 2)
            .fetch("Paris", "key", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), Some(502));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_arguments_rejected_before_io() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let pipeline = pipeline(&fetcher, 3);
        let token = CancellationToken::new();

        let err = pipeline.fetch("  ", "key", &token).await.unwrap_err();
        assert!(matches!(err, WeatherError::InvalidArgument(_)));

        let err = pipeline.fetch("London", " ", &token).await.unwrap_err();
        assert!(matches!(err, WeatherError::InvalidArgument(_)));

        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_delay() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.fail_city("london", transient());
        let pipeline = FetchPipeline::new(
            fetcher.clone(),
            RetryPolicy::new(3, Duration::from_secs(60)),
        );

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = pipeline.fetch("London", "key", &token).await.unwrap_err();

        assert_eq!(err, WeatherError::Interrupted);
        assert_eq!(fetcher.calls(), 1);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_request() {
        let fetcher = Arc::new(ScriptedFetcher::with_latency(Duration::from_secs(30)));
        let pipeline = pipeline(&fetcher, 3);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = pipeline.fetch("London", "key", &token).await.unwrap_err();
        assert_eq!(err, WeatherError::Interrupted);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = pipeline(&fetcher, 3)
            .fetch("London", "key", &token)
            .await
            .unwrap_err();

        assert_eq!(err, WeatherError::Interrupted);
        assert_eq!(fetcher.calls(), 0);
    }
}
