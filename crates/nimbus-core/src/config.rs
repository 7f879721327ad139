use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default OpenWeather current-conditions endpoint
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "NIMBUS_API_KEY";

/// Shortest polling interval accepted in polling mode
pub const MIN_POLLING_INTERVAL_SECS: u64 = 60;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a summary of all errors joined by `; `
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// How cached entries are kept fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Fetch only when a caller asks and the cache misses.
    #[default]
    OnDemand,
    /// Additionally re-fetch every cached city on a fixed period.
    Polling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Weather client settings
    #[serde(default)]
    pub weather: WeatherSettings,

    /// Log filter settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherSettings {
    /// OpenWeather API key (falls back to `NIMBUS_API_KEY`)
    pub api_key: Option<String>,

    /// Endpoint for current conditions
    pub base_url: String,

    pub mode: RefreshMode,

    /// Refresh period in polling mode
    pub polling_interval_secs: u64,

    /// Maximum number of cached cities
    pub cache_size: usize,

    /// Age after which a cached entry is treated as absent
    pub cache_ttl_secs: u64,

    pub connect_timeout_secs: u64,

    pub read_timeout_secs: u64,

    /// Total tries per fetch, including the first
    pub max_attempts: u32,

    /// Fixed pause between attempts
    pub retry_delay_ms: u64,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_WEATHER_URL.to_string(),
            mode: RefreshMode::OnDemand,
            polling_interval_secs: 300,
            cache_size: 10,
            cache_ttl_secs: 600,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl WeatherSettings {
    /// The configured API key, or `NIMBUS_API_KEY` when the file has none.
    /// Trimmed; blank values count as absent.
    pub fn effective_api_key(&self) -> Option<String> {
        let non_blank = |k: &str| {
            let k = k.trim();
            (!k.is_empty()).then(|| k.to_string())
        };

        self.api_key
            .as_deref()
            .and_then(non_blank)
            .or_else(|| std::env::var(API_KEY_ENV).ok().as_deref().and_then(non_blank))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            weather: WeatherSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let weather = &self.weather;

        self.validate_url(&weather.base_url, "weather.base_url", &mut result);

        if weather.effective_api_key().is_none() {
            result.add_warning(
                "weather.api_key",
                format!("API key not configured - set it here or via {}", API_KEY_ENV),
            );
        }

        if weather.cache_size == 0 {
            result.add_error("weather.cache_size", "Cache size must be positive");
        } else if weather.cache_size > 10_000 {
            result.add_warning("weather.cache_size", "Cache size is unusually large (>10000)");
        }

        if weather.cache_ttl_secs == 0 {
            result.add_error("weather.cache_ttl_secs", "Cache TTL must be positive");
        }

        if weather.mode == RefreshMode::Polling {
            if weather.polling_interval_secs < MIN_POLLING_INTERVAL_SECS {
                result.add_error(
                    "weather.polling_interval_secs",
                    format!(
                        "Polling interval must be at least {} seconds in polling mode",
                        MIN_POLLING_INTERVAL_SECS
                    ),
                );
            } else if weather.polling_interval_secs > 86_400 {
                result.add_warning(
                    "weather.polling_interval_secs",
                    "Polling interval is more than 24 hours",
                );
            }
        }

        if weather.connect_timeout_secs == 0 {
            result.add_error(
                "weather.connect_timeout_secs",
                "Connection timeout must be positive",
            );
        }
        if weather.read_timeout_secs == 0 {
            result.add_error("weather.read_timeout_secs", "Read timeout must be positive");
        } else if weather.read_timeout_secs < weather.connect_timeout_secs {
            result.add_error(
                "weather.read_timeout_secs",
                "Read timeout must be greater than or equal to connection timeout",
            );
        }

        if weather.max_attempts == 0 {
            result.add_error("weather.max_attempts", "Max attempts must be at least 1");
        } else if weather.max_attempts > 10 {
            result.add_warning(
                "weather.max_attempts",
                "More than 10 attempts per fetch can stall callers for a long time",
            );
        }

        if weather.retry_delay_ms == 0 {
            result.add_error("weather.retry_delay_ms", "Retry delay must be positive");
        }

        if self.logging.filter.trim().is_empty() {
            result.add_warning("logging.filter", "Empty log filter, falling back to info");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}
