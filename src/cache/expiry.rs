//! TTL envelope cache
//!
//! Values are stored as `{value, expiry}` JSON envelopes with an absolute
//! unix-millisecond expiry. Reads purge expired and corrupt entries lazily;
//! writes are best-effort (a full disk degrades to no caching, never to an
//! error). One uniform TTL applies to every enrichment category.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::medium::CacheMedium;

/// Default time-to-live for cached enrichment data (24 hours)
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Millisecond clock, swappable so tests can advance time
pub trait Clock: Send + Sync {
    /// Current unix time in milliseconds
    fn now_ms(&self) -> i64;
}

/// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Stored envelope: the payload plus its absolute expiry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    value: serde_json::Value,
    expiry: i64,
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses caused by TTL expiry (subset of `misses`)
    pub expirations: u64,
}

/// Expiring key/value cache over a persistent medium
pub struct ExpiringCache {
    medium: Arc<dyn CacheMedium>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl ExpiringCache {
    /// Create a cache with the default 24h TTL
    pub fn new(medium: Arc<dyn CacheMedium>) -> Self {
        Self::with_ttl(medium, CACHE_TTL)
    }

    /// Create a cache with a custom TTL
    pub fn with_ttl(medium: Arc<dyn CacheMedium>, ttl: Duration) -> Self {
        Self::with_clock(medium, ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock (tests advance it manually)
    pub fn with_clock(medium: Arc<dyn CacheMedium>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            medium,
            clock,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read a cached value. Never errors: expired entries and corrupt
    /// envelopes are deleted and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(raw) = self.medium.read(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = key, "Cache miss");
            return None;
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(key = key, error = %e, "Corrupt cache envelope, deleting");
                self.medium.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if self.clock.now_ms() > envelope.expiry {
            debug!(key = key, "Cache entry expired");
            self.medium.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match serde_json::from_value(envelope.value) {
            Ok(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                Some(v)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cached value has unexpected shape, deleting");
                self.medium.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with the configured TTL. Best-effort: write failures
    /// are logged, never propagated.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize cache value");
                return;
            }
        };

        let envelope = CacheEnvelope {
            value,
            expiry: self.clock.now_ms() + self.ttl.as_millis() as i64,
        };

        // Envelope serialization cannot fail for a Value payload
        let raw = match serde_json::to_string(&envelope) {
            Ok(r) => r,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize cache envelope");
                return;
            }
        };

        if let Err(e) = self.medium.write(key, &raw) {
            warn!(key = key, error = %e, "Cache write failed");
        }
    }

    /// Remove a key unconditionally
    pub fn remove(&self, key: &str) {
        self.medium.remove(key);
    }

    /// Hit/miss counters since construction
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
