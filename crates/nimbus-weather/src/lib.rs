//! Cached, retrying weather client for Nimbus
//!
//! Fetches current conditions from the OpenWeather API behind an LRU/TTL
//! cache, retries transient failures, optionally keeps cached cities fresh in
//! the background, and tracks request metrics.

pub mod cache;
pub mod client;
pub mod config;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::{CacheError, TtlCache, WeatherCache};
pub use client::WeatherClient;
pub use config::{SdkConfig, SdkConfigBuilder};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use provider::{Fetcher, OpenWeatherFetcher};
pub use registry::WeatherRegistry;
pub use retry::{Attempt, FetchPipeline, RetryPolicy};
pub use scheduler::RefreshScheduler;
pub use types::*;

pub use nimbus_core::{NetworkErrorKind, RefreshMode, WeatherError};
