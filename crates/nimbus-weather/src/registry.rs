//! Keyed set of independently configured clients.
//!
//! The registry is an ordinary value: create one where the application wires
//! its services and pass it around. Removing an entry shuts its client down.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use nimbus_core::{ConfigError, WeatherError};
use parking_lot::RwLock;

use crate::client::WeatherClient;
use crate::config::SdkConfig;

#[derive(Debug, Default)]
pub struct WeatherRegistry {
    clients: RwLock<HashMap<String, Arc<WeatherClient>>>,
}

fn validate_key(api_key: &str) -> Result<(), WeatherError> {
    if api_key.trim().is_empty() {
        return Err(ConfigError::invalid("api_key", "API key must not be empty").into());
    }
    Ok(())
}

fn duplicate_key() -> WeatherError {
    ConfigError::invalid("api_key", "API key already registered").into()
}

impl WeatherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client with the OpenWeather fetcher and register it under `api_key`.
    ///
    /// # Errors
    /// `Config(Invalid { field: "api_key" })` for a blank or already registered
    /// key, or any error from client construction.
    pub fn create(&self, api_key: &str, config: SdkConfig) -> Result<Arc<WeatherClient>, WeatherError> {
        validate_key(api_key)?;

        let mut clients = self.clients.write();
        let client = match clients.entry(api_key.to_string()) {
            Entry::Occupied(_) => return Err(duplicate_key()),
            Entry::Vacant(slot) => {
                let client = Arc::new(WeatherClient::new(config)?);
                slot.insert(Arc::clone(&client));
                client
            }
        };

        tracing::info!("Registered weather client ({} total)", clients.len());
        Ok(client)
    }

    /// Register an already built client.
    ///
    /// # Errors
    /// Same key rules as [`create`](Self::create).
    pub fn insert(&self, api_key: &str, client: Arc<WeatherClient>) -> Result<(), WeatherError> {
        validate_key(api_key)?;

        match self.clients.write().entry(api_key.to_string()) {
            Entry::Occupied(_) => Err(duplicate_key()),
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(())
            }
        }
    }

    pub fn get(&self, api_key: &str) -> Option<Arc<WeatherClient>> {
        self.clients.read().get(api_key).cloned()
    }

    /// Unregister and shut down the client for `api_key`.
    ///
    /// # Errors
    /// `InvalidArgument` if nothing is registered under that key.
    pub async fn remove(&self, api_key: &str) -> Result<(), WeatherError> {
        let client = self
            .clients
            .write()
            .remove(api_key)
            .ok_or_else(|| WeatherError::invalid_argument("API key not found"))?;

        client.shutdown().await;
        tracing::info!("Removed weather client");
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.clients.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Shut down and drop every registered client.
    pub async fn clear(&self) {
        let drained: Vec<_> = self.clients.write().drain().map(|(_, c)| c).collect();
        for client in &drained {
            client.shutdown().await;
        }
        if !drained.is_empty() {
            tracing::info!("Cleared {} weather clients", drained.len());
        }
    }
}
