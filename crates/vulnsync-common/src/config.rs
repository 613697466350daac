//! Configuration management for VulnSync components
//!
//! Configuration is loaded once at the binary edge (TOML file, then
//! environment overrides) and handed to each component as plain values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use vulnsync_core::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local store settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// NVD feed settings
    #[serde(default)]
    pub nvd: NvdConfig,

    /// Retry/backoff settings for feed requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// Lookup cache TTLs
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Merge with process environment variables
    pub fn merge_env(self) -> Self {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Merge with variables from an arbitrary lookup (the process environment
    /// in production, a map in tests). Unparseable numbers are ignored.
    pub fn merge_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u32>().ok());

        if let Some(val) = lookup("VULNSYNC_DB") {
            self.database.path = val;
        }

        // NVD settings
        if let Some(val) = lookup("NVD_API_KEY") {
            self.nvd.api_key = if val.trim().is_empty() { None } else { Some(val) };
        }
        if let Some(val) = lookup("VULNSYNC_UA") {
            self.nvd.user_agent = val;
        }
        if let Some(n) = number("NVD_MAX_PER_30S") {
            self.nvd.max_requests_per_30s = Some(n);
        }
        if let Some(n) = number("NVD_MAX_DAYS_PER_REQUEST") {
            self.nvd.max_days_per_request = n;
        }

        // Cache TTLs
        if let Some(n) = number("OSV_TTL_HOURS") {
            self.cache.osv_ttl_hours = n;
        }
        if let Some(n) = number("KEV_TTL_HOURS") {
            self.cache.kev_ttl_hours = n;
        }
        if let Some(n) = number("EPSS_TTL_HOURS") {
            self.cache.epss_ttl_hours = n;
        }

        // Logging
        if let Some(val) = lookup("VULNSYNC_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("VULNSYNC_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }

    /// Reject values that would stall or break a sync
    pub fn validate(&self) -> Result<()> {
        fn positive(key: &str, value: u32) -> Result<()> {
            if value == 0 {
                return Err(Error::InvalidConfig {
                    key: key.to_string(),
                    message: String::from("must be greater than zero"),
                });
            }
            Ok(())
        }

        positive("nvd.max_days_per_request", self.nvd.max_days_per_request)?;
        positive("nvd.results_per_page", self.nvd.results_per_page)?;
        if let Some(n) = self.nvd.max_requests_per_30s {
            positive("nvd.max_requests_per_30s", n)?;
        }
        positive("retry.max_attempts", self.retry.max_attempts)?;

        if self.retry.min_backoff_seconds > self.retry.max_backoff_seconds {
            return Err(Error::InvalidConfig {
                key: String::from("retry.min_backoff_seconds"),
                message: String::from("must not exceed retry.max_backoff_seconds"),
            });
        }
        Ok(())
    }
}

/// Local database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    String::from("vulnsync.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// NVD feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvdConfig {
    /// NVD CVE API 2.0 endpoint
    #[serde(default = "default_nvd_api_url")]
    pub api_url: String,

    /// NVD API key (optional, for higher rate limits)
    pub api_key: Option<String>,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Requests allowed per rolling 30s (defaults to the tier implied by `api_key`)
    pub max_requests_per_30s: Option<u32>,

    /// Widest `lastModified` range sent in one query
    #[serde(default = "default_max_days")]
    pub max_days_per_request: u32,

    /// Lookback used when no checkpoint exists
    #[serde(default = "default_lookback_hours")]
    pub default_lookback_hours: u32,

    /// Page size hint
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,

    /// Extra sleep after a 429 before the retry is counted
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_seconds: u32,
}

/// NVD public limits: 50 requests/30s with an API key, 5 without
pub const NVD_LIMIT_WITH_KEY: u32 = 50;
pub const NVD_LIMIT_WITHOUT_KEY: u32 = 5;

impl NvdConfig {
    /// Rate limit in effect: explicit setting, otherwise the key's tier
    pub fn effective_rate_limit(&self) -> u32 {
        match (self.max_requests_per_30s, &self.api_key) {
            (Some(n), _) => n,
            (None, Some(_)) => NVD_LIMIT_WITH_KEY,
            (None, None) => NVD_LIMIT_WITHOUT_KEY,
        }
    }
}

fn default_nvd_api_url() -> String {
    String::from("https://services.nvd.nist.gov/rest/json/cves/2.0")
}

fn default_user_agent() -> String {
    format!("VulnSync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_days() -> u32 {
    7
}

fn default_lookback_hours() -> u32 {
    24
}

fn default_results_per_page() -> u32 {
    2000
}

fn default_request_timeout() -> u32 {
    60
}

fn default_rate_limit_cooldown() -> u32 {
    30
}

impl Default for NvdConfig {
    fn default() -> Self {
        Self {
            api_url: default_nvd_api_url(),
            api_key: None,
            user_agent: default_user_agent(),
            max_requests_per_30s: None,
            max_days_per_request: default_max_days(),
            default_lookback_hours: default_lookback_hours(),
            results_per_page: default_results_per_page(),
            request_timeout_seconds: default_request_timeout(),
            rate_limit_cooldown_seconds: default_rate_limit_cooldown(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Multiplier applied to 2^(retry - 1)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Backoff floor in seconds
    #[serde(default = "default_min_backoff")]
    pub min_backoff_seconds: u64,

    /// Backoff ceiling in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_min_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            multiplier: default_multiplier(),
            min_backoff_seconds: default_min_backoff(),
            max_backoff_seconds: default_max_backoff(),
        }
    }
}

/// Lookup cache TTLs, in hours
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_osv_ttl")]
    pub osv_ttl_hours: u32,

    #[serde(default = "default_kev_ttl")]
    pub kev_ttl_hours: u32,

    #[serde(default = "default_epss_ttl")]
    pub epss_ttl_hours: u32,
}

fn default_osv_ttl() -> u32 {
    12
}

fn default_kev_ttl() -> u32 {
    24
}

fn default_epss_ttl() -> u32 {
    720
}

impl CacheConfig {
    /// TTL for a cache namespace; unknown namespaces use the OSV TTL
    pub fn ttl_hours(&self, namespace: &str) -> u32 {
        match namespace {
            "kev" => self.kev_ttl_hours,
            "epss" => self.epss_ttl_hours,
            _ => self.osv_ttl_hours,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            osv_ttl_hours: default_osv_ttl(),
            kev_ttl_hours: default_kev_ttl(),
            epss_ttl_hours: default_epss_ttl(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Builder for constructing Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.config.database.path = path.into();
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.nvd.api_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.nvd.api_key = Some(key.into());
        self
    }

    pub fn max_requests_per_30s(mut self, n: u32) -> Self {
        self.config.nvd.max_requests_per_30s = Some(n);
        self
    }

    pub fn max_days_per_request(mut self, days: u32) -> Self {
        self.config.nvd.max_days_per_request = days;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, "vulnsync.db");
        assert_eq!(config.nvd.max_days_per_request, 7);
        assert_eq!(config.nvd.results_per_page, 2000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.min_backoff_seconds, 5);
        assert_eq!(config.retry.max_backoff_seconds, 120);
        assert_eq!(config.cache.osv_ttl_hours, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [database]
            path = "/var/lib/vulnsync/vulns.db"

            [nvd]
            api_key = "secret-key"
            max_days_per_request = 3

            [retry]
            max_attempts = 2

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.database.path, "/var/lib/vulnsync/vulns.db");
        assert_eq!(config.nvd.api_key, Some(String::from("secret-key")));
        assert_eq!(config.nvd.max_days_per_request, 3);
        assert_eq!(config.nvd.results_per_page, 2000);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_backoff_seconds, 120);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vulnsync.toml");
        std::fs::write(&path, "[cache]\nosv_ttl_hours = 1\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.cache.osv_ttl_hours, 1);
        assert_eq!(config.cache.kev_ttl_hours, 24);

        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("[nvd\nmax_days_per_request ="),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_merge_env() {
        let env: HashMap<&str, &str> = [
            ("VULNSYNC_DB", "/tmp/env.db"),
            ("NVD_API_KEY", "env-key"),
            ("NVD_MAX_PER_30S", "40"),
            ("NVD_MAX_DAYS_PER_REQUEST", "not-a-number"),
            ("OSV_TTL_HOURS", "6"),
            ("VULNSYNC_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().merge_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, "/tmp/env.db");
        assert_eq!(config.nvd.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.nvd.max_requests_per_30s, Some(40));
        assert_eq!(config.nvd.max_days_per_request, 7);
        assert_eq!(config.cache.osv_ttl_hours, 6);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_effective_rate_limit() {
        let mut nvd = NvdConfig::default();
        assert_eq!(nvd.effective_rate_limit(), NVD_LIMIT_WITHOUT_KEY);

        nvd.api_key = Some(String::from("k"));
        assert_eq!(nvd.effective_rate_limit(), NVD_LIMIT_WITH_KEY);

        nvd.max_requests_per_30s = Some(10);
        assert_eq!(nvd.effective_rate_limit(), 10);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = Config::builder().max_days_per_request(0).build();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { ref key, .. }) if key == "nvd.max_days_per_request"
        ));

        let config = Config::builder().max_requests_per_30s(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .database_path("/tmp/test.db")
            .api_url("http://localhost:9999")
            .api_key("key123")
            .log_level("warn")
            .build();

        assert_eq!(config.database.path, "/tmp/test.db");
        assert_eq!(config.nvd.api_url, "http://localhost:9999");
        assert_eq!(config.nvd.api_key, Some(String::from("key123")));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_cache_ttl_by_namespace() {
        let cache = CacheConfig::default();
        assert_eq!(cache.ttl_hours("osv"), 12);
        assert_eq!(cache.ttl_hours("kev"), 24);
        assert_eq!(cache.ttl_hours("epss"), 720);
        assert_eq!(cache.ttl_hours("other"), 12);
    }
}
