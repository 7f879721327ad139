//! Immutable client configuration and its validating builder.

use std::time::Duration;

use nimbus_core::config::MIN_POLLING_INTERVAL_SECS;
use nimbus_core::{ConfigError, RefreshMode, WeatherSettings, DEFAULT_WEATHER_URL};

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_SIZE: usize = 10;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Validated settings for one `WeatherClient`. Never mutated after `build()`.
#[derive(Clone, PartialEq, Eq)]
pub struct SdkConfig {
    api_key: String,
    base_url: String,
    mode: RefreshMode,
    polling_interval: Duration,
    cache_size: usize,
    cache_ttl: Duration,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl SdkConfig {
    pub fn builder() -> SdkConfigBuilder {
        SdkConfigBuilder::default()
    }

    /// Build from the `[weather]` section of the file configuration.
    ///
    /// # Errors
    /// `MissingSetting` when no API key is configured, otherwise the first
    /// validation failure.
    pub fn from_settings(settings: &WeatherSettings) -> Result<Self, ConfigError> {
        let api_key = settings
            .effective_api_key()
            .ok_or_else(|| ConfigError::MissingSetting("weather.api_key".to_string()))?;

        Self::builder()
            .api_key(api_key)
            .base_url(settings.base_url.clone())
            .mode(settings.mode)
            .polling_interval(Duration::from_secs(settings.polling_interval_secs))
            .cache_size(settings.cache_size)
            .cache_ttl(Duration::from_secs(settings.cache_ttl_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .read_timeout(Duration::from_secs(settings.read_timeout_secs))
            .max_attempts(settings.max_attempts)
            .retry_delay(Duration::from_millis(settings.retry_delay_ms))
            .build()
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn refresh_enabled(&self) -> bool {
        self.mode == RefreshMode::Polling
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

// The API key is a credential: keep it out of logs.
impl std::fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("mode", &self.mode)
            .field("polling_interval", &self.polling_interval)
            .field("cache_size", &self.cache_size)
            .field("cache_ttl", &self.cache_ttl)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SdkConfigBuilder {
    api_key: Option<String>,
    base_url: String,
    mode: RefreshMode,
    polling_interval: Duration,
    cache_size: usize,
    cache_ttl: Duration,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Default for SdkConfigBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_WEATHER_URL.to_string(),
            mode: RefreshMode::OnDemand,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl SdkConfigBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Validate every setting and freeze the result.
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn build(self) -> Result<SdkConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ConfigError::invalid("api_key", "API key is required and must not be empty")
            })?
            .to_string();

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("base_url", "Base URL must not be empty"));
        }

        if self.mode == RefreshMode::Polling {
            if self.polling_interval.is_zero() {
                return Err(ConfigError::invalid(
                    "polling_interval",
                    "Polling interval must be positive for polling mode",
                ));
            }
            if self.polling_interval < Duration::from_secs(MIN_POLLING_INTERVAL_SECS) {
                return Err(ConfigError::invalid(
                    "polling_interval",
                    "Polling interval too short for polling mode",
                ));
            }
        }

        if self.cache_size == 0 {
            return Err(ConfigError::invalid("cache_size", "Cache size must be positive"));
        }
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::invalid("cache_ttl", "Cache TTL must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "connect_timeout",
                "Connection timeout must be positive",
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::invalid("read_timeout", "Read timeout must be positive"));
        }
        if self.read_timeout < self.connect_timeout {
            return Err(ConfigError::invalid(
                "read_timeout",
                "Read timeout must be greater than or equal to connection timeout",
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "Max attempts must be at least 1"));
        }
        if self.retry_delay.is_zero() {
            return Err(ConfigError::invalid("retry_delay", "Retry delay must be positive"));
        }

        Ok(SdkConfig {
            api_key,
            base_url: self.base_url.trim().to_string(),
            mode: self.mode,
            polling_interval: self.polling_interval,
            cache_size: self.cache_size,
            cache_ttl: self.cache_ttl,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
        })
    }
}
