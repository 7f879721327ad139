//! Scripted fetcher shared by the unit tests.

#![allow(clippy::panic)]

use async_trait::async_trait;
use nimbus_core::{NetworkErrorKind, WeatherError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::provider::Fetcher;
use crate::types::WeatherData;

pub(crate) fn transient() -> WeatherError {
    WeatherError::network(NetworkErrorKind::Connection, None, "connection reset")
}

/// Replays queued results in order; once the queue is empty every call
/// succeeds (or fails, per key) according to the fallback rules.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<WeatherData, WeatherError>>>,
    failing: Mutex<HashMap<String, WeatherError>>,
    panicking: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    calls: AtomicU32,
    seen: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub(crate) fn push(&self, result: Result<WeatherData, WeatherError>) -> &Self {
        self.script.lock().push_back(result);
        self
    }

    /// Make every call for `city` fail with `err`.
    pub(crate) fn fail_city(&self, city: &str, err: WeatherError) {
        self.failing.lock().insert(city.to_lowercase(), err);
    }

    /// Panic on the next call for `city`, then behave normally.
    pub(crate) fn panic_once(&self, city: &str) {
        self.panicking.lock().insert(city.to_lowercase());
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, city: &str, _api_key: &str) -> Result<WeatherData, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(city.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.panicking.lock().remove(&city.to_lowercase()) {
            panic!("scripted panic for {}", city);
        }

        if let Some(err) = self.failing.lock().get(&city.to_lowercase()) {
            return Err(err.clone());
        }

        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(WeatherData::sample(city)))
    }
}
