//! Storage seams used by the sync engine and the lookup cache
//!
//! The SQLite implementation lives in `vulnsync-db`; tests and alternative
//! backends only need to satisfy these traits.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A vulnerability record ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Natural identifier (e.g. "CVE-2021-44228")
    pub id: String,
    /// Feed tag (e.g. "NVD")
    pub source: String,
    /// Normalized last-modified timestamp
    pub modified: String,
    /// Raw feed payload
    pub payload: serde_json::Value,
}

/// Idempotent record storage plus a small key/value metadata table
pub trait RecordStore: Send + Sync {
    /// Insert or replace every record in one transaction, keyed by `Record::id`.
    /// Returns the number of rows written.
    fn upsert_records(&self, records: &[Record]) -> Result<usize>;

    /// Read a metadata value
    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a metadata value
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Number of stored records
    fn record_count(&self) -> Result<u64>;
}

/// Composite cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Lookup family (e.g. "osv", "kev", "epss")
    pub namespace: String,
    /// Item within the family (e.g. "PyPI/requests")
    pub key: String,
    /// Item version (e.g. "2.31.0")
    pub version: String,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.namespace, self.key, self.version)
    }
}

/// A stored cache payload and when it was fetched
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Serialized payload
    pub payload: String,
    /// Fetch time, `None` if the stored value could not be parsed
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Point lookup / upsert storage for cached payloads
pub trait CacheStore: Send + Sync {
    /// Insert or overwrite the entry for `key`
    fn put_cache_entry(&self, key: &CacheKey, payload: &str, fetched_at: DateTime<Utc>)
        -> Result<()>;

    /// Fetch the entry for `key`, if any
    fn get_cache_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
}
