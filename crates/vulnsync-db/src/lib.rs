//! VulnSync DB - Local SQLite storage
//!
//! This crate provides:
//! - `VulnDb`: SQLite store for synced records, sync metadata and cached lookups
//! - `TtlCache`: read-time expiring cache for per-package lookups

pub mod cache;
pub mod database;

pub use cache::{canonical_json, TtlCache};
pub use database::VulnDb;
