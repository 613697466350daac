//! VulnSync Common - Shared utilities: configuration and logging
//!
//! This crate provides common functionality used by the VulnSync binaries.

pub mod config;
pub mod logging;

pub use config::{
    CacheConfig, Config, ConfigBuilder, DatabaseConfig, LoggingConfig, NvdConfig, RetryConfig,
};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogFormat};
