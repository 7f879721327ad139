//! Centralized error types for Nimbus.
//!
//! This module provides a typed error hierarchy that:
//! - Separates caller misuse from upstream-classified failures
//! - Tells the fetch pipeline which failures may be retried
//! - Provides user-friendly messages alongside the detailed `Display` output

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message suitable for end users.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    /// Shorthand for an `Invalid` error on a named field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The offending field, if the error names one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { field, .. } => Some(field),
            ConfigError::MissingSetting(field) => Some(field),
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid { .. } => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

/// What went wrong below the HTTP status layer, or which status class was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Connection refused, reset, DNS failure or other transport I/O error.
    Connection,
    /// Connect or read timeout elapsed.
    Timeout,
    /// The service answered with a 5xx status.
    Server,
    /// The service answered with a status that has no dedicated variant.
    UnexpectedStatus,
    /// The body was empty or could not be decoded.
    InvalidResponse,
}

impl NetworkErrorKind {
    pub fn category(&self) -> &'static str {
        match self {
            NetworkErrorKind::Connection => "Connection Error",
            NetworkErrorKind::Timeout => "Timeout",
            NetworkErrorKind::Server => "Server Error (5xx)",
            NetworkErrorKind::UnexpectedStatus => "HTTP Error",
            NetworkErrorKind::InvalidResponse => "Invalid Response",
        }
    }
}

/// Weather fetch errors.
///
/// `Unauthorized`, `NotFound` and `RateLimited` are terminal and surface on
/// first occurrence. `Network` failures of kind `Connection`, `Timeout` or
/// `Server` are retried by the fetch pipeline until the attempt budget runs out.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WeatherError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error: {message}")]
    Network {
        kind: NetworkErrorKind,
        status: Option<u16>,
        /// Number of attempts made before this error surfaced.
        attempts: u32,
        message: String,
    },

    #[error("Request was interrupted while fetching weather data")]
    Interrupted,

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl WeatherError {
    /// Single-attempt network failure.
    pub fn network(kind: NetworkErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        WeatherError::Network {
            kind,
            status,
            attempts: 1,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        WeatherError::InvalidArgument(message.into())
    }

    /// Whether the fetch pipeline may try again after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            WeatherError::Network { kind, status, .. } => {
                matches!(kind, NetworkErrorKind::Connection | NetworkErrorKind::Timeout)
                    || status.is_some_and(|s| s >= 500)
            }
            _ => false,
        }
    }

    /// Upstream-classified failures that must never be retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WeatherError::Unauthorized(_)
                | WeatherError::NotFound(_)
                | WeatherError::RateLimited { .. }
        )
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            WeatherError::Unauthorized(_) => Some(401),
            WeatherError::NotFound(_) => Some(404),
            WeatherError::RateLimited { .. } => Some(429),
            WeatherError::Network { status, .. } => *status,
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::InvalidArgument(_) => "Invalid request. Check the city name.",
            WeatherError::Unauthorized(_) => "Weather API key is invalid. Check settings.",
            WeatherError::NotFound(_) => "Location not found. Check and try again.",
            WeatherError::RateLimited { .. } => {
                "Weather service rate limit exceeded. Please wait and try again."
            }
            WeatherError::Network { status: Some(s), .. } if *s >= 500 => {
                "Weather service unavailable. Please try again later."
            }
            WeatherError::Network { .. } => "Unable to reach the weather service.",
            WeatherError::Interrupted => "The request was cancelled.",
            WeatherError::IllegalState(_) => "The weather client has been shut down.",
            WeatherError::Config(e) => e.user_message(),
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_weather_error(self) -> WeatherError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_weather_error(self) -> WeatherError {
        if self.is_timeout() {
            WeatherError::network(
                NetworkErrorKind::Timeout,
                None,
                format!("Request timed out: {}", self),
            )
        } else if self.is_decode() {
            WeatherError::network(
                NetworkErrorKind::InvalidResponse,
                self.status().map(|s| s.as_u16()),
                format!("Failed to parse weather data from response: {}", self),
            )
        } else if let Some(status) = self.status() {
            let kind = if status.is_server_error() {
                NetworkErrorKind::Server
            } else {
                NetworkErrorKind::UnexpectedStatus
            };
            WeatherError::network(kind, Some(status.as_u16()), self.to_string())
        } else {
            WeatherError::network(
                NetworkErrorKind::Connection,
                None,
                format!("Network error occurred while fetching weather data: {}", self),
            )
        }
    }
}
