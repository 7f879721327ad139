//! In-memory LRU cache with lazy TTL expiration.
//!
//! Keys are normalized (trimmed, lowercased) before every operation, so
//! `"London"` and `"  LONDON "` address the same entry.
//!
//! Entries live in an `IndexMap` ordered from least to most recently used:
//! reads and writes move an entry to the back, eviction pops the front.
//! Expired entries are only dropped when a read finds them; there is no
//! background sweep.

use indexmap::IndexMap;
use nimbus_core::WeatherError;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::types::WeatherData;

/// Cache of weather records keyed by normalized city name.
pub type WeatherCache = TtlCache<WeatherData>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("City name must not be empty")]
    InvalidKey,

    #[error("Max size must be positive")]
    InvalidCapacity,

    #[error("TTL must be positive")]
    InvalidTtl,
}

impl From<CacheError> for WeatherError {
    fn from(err: CacheError) -> Self {
        WeatherError::InvalidArgument(err.to_string())
    }
}

/// Trim and case-fold a key. Fails on blank input.
pub fn normalize_key(key: &str) -> Result<String, CacheError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(trimmed.to_lowercase())
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Size-bounded, time-bounded map shared between callers and the refresh task.
///
/// Every operation takes the single internal lock, so operations are totally
/// ordered and `size()` never observes more than `capacity` entries.
#[derive(Debug)]
pub struct TtlCache<V> {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<IndexMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity);
        }
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }

        Ok(Self {
            capacity,
            ttl,
            entries: Mutex::new(IndexMap::with_capacity(capacity + 1)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh entry and mark it most recently used.
    ///
    /// An entry older than the TTL is removed and reported as absent.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let key = normalize_key(key)?;
        let mut map = self.entries.lock();

        let Some(idx) = map.get_index_of(&key) else {
            return Ok(None);
        };

        let expired = map
            .get_index(idx)
            .map(|(_, entry)| entry.is_expired(self.ttl))
            .unwrap_or(false);
        if expired {
            map.shift_remove_index(idx);
            tracing::debug!("Cache entry expired: {}", key);
            return Ok(None);
        }

        let last = map.len() - 1;
        map.move_index(idx, last);
        Ok(map.get_index(last).map(|(_, entry)| entry.value.clone()))
    }

    /// Insert or replace an entry, evicting the least recently used one if full.
    ///
    /// Replacing an existing key refreshes its timestamp without changing the size.
    pub fn put(&self, key: &str, value: V) -> Result<(), CacheError> {
        let key = normalize_key(key)?;
        let mut map = self.entries.lock();

        if let Some(idx) = map.get_index_of(&key) {
            if let Some((_, entry)) = map.get_index_mut(idx) {
                *entry = CacheEntry::new(value);
            }
            let last = map.len() - 1;
            map.move_index(idx, last);
            return Ok(());
        }

        while map.len() >= self.capacity {
            match map.shift_remove_index(0) {
                Some((evicted, _)) => tracing::debug!("Evicted least recently used: {}", evicted),
                None => break,
            }
        }
        map.insert(key, CacheEntry::new(value));
        Ok(())
    }

    /// Remove an entry. Absent keys are a no-op.
    pub fn evict(&self, key: &str) -> Result<(), CacheError> {
        let key = normalize_key(key)?;
        self.entries.lock().shift_remove(&key);
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot of the resident keys, least recently used first.
    ///
    /// May include entries that have expired but not yet been read.
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}
