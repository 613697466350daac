//! VulnSync Core - Foundation types, traits, and error handling
//!
//! This crate provides the core abstractions used throughout VulnSync:
//! - `TimeWindow`: a `[start, end)` range and the splitter for feed queries
//! - `RecordStore` / `CacheStore`: the storage seams
//! - `Clock`: injectable wall clock
//! - `Error`: the shared error taxonomy

pub mod clock;
pub mod error;
pub mod store;
pub mod window;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use store::{CacheEntry, CacheKey, CacheStore, Record, RecordStore};
pub use window::{split, TimeWindow};
