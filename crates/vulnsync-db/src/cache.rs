//! TTL cache for secondary per-package lookups (OSV, KEV, EPSS)
//!
//! Entries are never evicted. Staleness is decided when reading: an entry
//! whose fetch time is earlier than `now - ttl` reads as a miss.

use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use vulnsync_core::{CacheKey, CacheStore, Clock, Result, SystemClock};

/// Time-bounded cache over a [`CacheStore`]
pub struct TtlCache<S: CacheStore> {
    store: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: CacheStore> TtlCache<S> {
    /// Create a cache using the system clock
    pub fn new(store: S, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock
    pub fn with_clock(store: S, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, ttl, clock }
    }

    /// Create a cache whose TTL is given in hours
    pub fn with_ttl_hours(store: S, hours: u32) -> Self {
        Self::new(store, Duration::hours(i64::from(hours)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `payload`, replacing any entry for the same key and resetting its age
    pub fn put(&self, namespace: &str, key: &str, version: &str, payload: &Value) -> Result<()> {
        let cache_key = CacheKey::new(namespace, key, version);
        let serialized = canonical_json(payload)?;
        self.store
            .put_cache_entry(&cache_key, &serialized, self.clock.now())?;
        debug!("Cached {}", cache_key);
        Ok(())
    }

    /// Return the cached payload if present and not older than the TTL
    pub fn get(&self, namespace: &str, key: &str, version: &str) -> Result<Option<Value>> {
        let cache_key = CacheKey::new(namespace, key, version);
        let Some(entry) = self.store.get_cache_entry(&cache_key)? else {
            return Ok(None);
        };

        let Some(fetched_at) = entry.fetched_at else {
            warn!("Cache entry {} has an unreadable fetch time", cache_key);
            return Ok(None);
        };

        let threshold = self.clock.now() - self.ttl;
        if fetched_at < threshold {
            debug!("Cache entry {} is stale (fetched {})", cache_key, fetched_at);
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&entry.payload)?))
    }
}

/// Compact JSON with sorted object keys, so equal payloads serialize identically
pub fn canonical_json(value: &Value) -> Result<String> {
    // serde_json's default Map is a BTreeMap, which already yields sorted keys
    Ok(serde_json::to_string(value)?)
}
