// crates/nimbus-weather/src/provider.rs

use async_trait::async_trait;
use nimbus_core::{ConfigError, NetworkErrorKind, ReqwestErrorExt, WeatherError};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::config::SdkConfig;
use crate::types::WeatherData;

/// One attempt at retrieving current weather for a city.
///
/// Implementations perform a single request and classify the outcome. Retry,
/// caching and cancellation are layered on top by the fetch pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, city: &str, api_key: &str) -> Result<WeatherData, WeatherError>;
}

/// Error body returned by the service on non-2xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP fetcher for the OpenWeather current-weather endpoint
#[derive(Debug, Clone)]
pub struct OpenWeatherFetcher {
    base_url: Url,
    client: Arc<Client>,
}

impl OpenWeatherFetcher {
    /// Build an HTTP client honoring the configured connect and read timeouts.
    pub fn new(config: &SdkConfig) -> Result<Self, WeatherError> {
        let base_url = Url::parse(config.base_url()).map_err(|e| {
            ConfigError::invalid("base_url", format!("Invalid base URL: {}", e))
        })?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| e.into_weather_error())?;

        Ok(Self {
            base_url,
            client: Arc::new(client),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn read_body(response: reqwest::Response) -> String {
        response.text().await.unwrap_or_default()
    }

    fn error_message(body: &str) -> Option<String> {
        serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
    }

    fn retry_after(response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    async fn handle_response(response: reqwest::Response) -> Result<WeatherData, WeatherError> {
        let status = response.status();

        match status {
            StatusCode::OK => {
                let body = Self::read_body(response).await;
                if body.trim().is_empty() {
                    return Err(WeatherError::network(
                        NetworkErrorKind::InvalidResponse,
                        Some(status.as_u16()),
                        "Empty response body from weather API",
                    ));
                }
                serde_json::from_str(&body).map_err(|e| {
                    WeatherError::network(
                        NetworkErrorKind::InvalidResponse,
                        Some(status.as_u16()),
                        format!("Failed to parse weather data from response: {}", e),
                    )
                })
            }
            StatusCode::UNAUTHORIZED => {
                Err(WeatherError::Unauthorized("Invalid or missing API key".to_string()))
            }
            StatusCode::NOT_FOUND => {
                let body = Self::read_body(response).await;
                let message =
                    Self::error_message(&body).unwrap_or_else(|| "Unknown error".to_string());
                Err(WeatherError::NotFound(format!("City not found: {}", message)))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(WeatherError::RateLimited {
                retry_after_secs: Self::retry_after(&response),
            }),
            s if s.is_server_error() => {
                let body = Self::read_body(response).await;
                Err(WeatherError::network(
                    NetworkErrorKind::Server,
                    Some(s.as_u16()),
                    format!("Server error (HTTP {}): {}", s.as_u16(), body),
                ))
            }
            s => {
                let body = Self::read_body(response).await;
                Err(WeatherError::network(
                    NetworkErrorKind::UnexpectedStatus,
                    Some(s.as_u16()),
                    format!("Unexpected HTTP status {}: {}", s.as_u16(), body),
                ))
            }
        }
    }
}

#[async_trait]
impl Fetcher for OpenWeatherFetcher {
    #[tracing::instrument(skip(self, api_key))]
    async fn fetch(&self, city: &str, api_key: &str) -> Result<WeatherData, WeatherError> {
        tracing::debug!("Requesting current weather");

        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[
                ("q", city.trim()),
                ("appid", api_key.trim()),
                ("units", "standard"),
            ])
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| e.into_weather_error())?;

        let data = Self::handle_response(response).await?;
        tracing::debug!("Received weather for {}", data.name);
        Ok(data)
    }
}
