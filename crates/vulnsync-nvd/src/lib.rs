//! VulnSync NVD - incremental CVE sync from the NVD API 2.0
//!
//! This crate provides:
//! - Sliding-window rate limiter matching NVD's 30 second quotas
//! - Paginated CVE API client
//! - Exponential backoff retry policy
//! - Delta sync orchestration with checkpointing

pub mod client;
pub mod ingest;
pub mod rate_limit;
pub mod retry;
pub mod sync;

pub use client::{ClientSettings, FeedSource, NvdClient, PageResult};
pub use ingest::{extract_record, normalize_timestamp, save_vulnerabilities, NVD_SOURCE};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use sync::{NvdSync, SyncSettings, SyncStats, CHECKPOINT_KEY};
