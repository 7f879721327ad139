//! Shared foundation for Nimbus: error taxonomy, file configuration and
//! logging setup.

pub mod config;
pub mod error;

pub use config::{
    Config, LoggingConfig, RefreshMode, ValidationResult, WeatherSettings, DEFAULT_WEATHER_URL,
};
pub use error::{AppError, ConfigError, NetworkErrorKind, ReqwestErrorExt, WeatherError};

use anyhow::Result;

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins over `default_filter`. Calling this more than once is harmless.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
        return Ok(());
    }

    tracing::info!("Nimbus core initialized");
    Ok(())
}
