//! Lock-free operational counters.
//!
//! Every counter is its own atomic, so a snapshot may combine values read at
//! slightly different instants. Derived rates are computed when the snapshot
//! is taken.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    total_requests: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    total_response_ms: AtomicU64,
    /// Epoch milliseconds of the most recent outcome; 0 until one is recorded.
    last_call_ms: AtomicI64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished request and add its duration to the running sum.
    pub fn record_outcome(&self, success: bool, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_response_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.last_call_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let last_call_ms = self.last_call_ms.load(Ordering::Relaxed);
        let last_call_time = if last_call_ms == 0 {
            None
        } else {
            Utc.timestamp_millis_opt(last_call_ms).single()
        };

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            total_response_ms: self.total_response_ms.load(Ordering::Relaxed),
            last_call_time,
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_response_ms: u64,
    pub last_call_time: Option<DateTime<Utc>>,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl MetricsSnapshot {
    /// Hits as a percentage of all cache lookups
    pub fn cache_hit_rate(&self) -> f64 {
        percent(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    /// Successes as a percentage of all requests
    pub fn success_rate(&self) -> f64 {
        percent(self.success_count, self.total_requests)
    }

    pub fn average_response_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_ms as f64 / self.total_requests as f64
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} success={} failure={} success_rate={:.2}% \
             cache_hits={} cache_misses={} hit_rate={:.2}% avg_response={:.2}ms",
            self.total_requests,
            self.success_count,
            self.failure_count,
            self.success_rate(),
            self.cache_hits,
            self.cache_misses,
            self.cache_hit_rate(),
            self.average_response_ms(),
        )?;
        if let Some(last) = self.last_call_time {
            write!(f, " last_call={}", last.to_rfc3339())?;
        }
        Ok(())
    }
}
