//! NVD CVE API 2.0 page client
//!
//! One call fetches one page of CVEs whose `lastModified` falls inside a time
//! window. Rate limiting happens here; retrying is left to [`RetryPolicy`].
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vulnsync_common::NvdConfig;
use vulnsync_core::{Error, Result, TimeWindow};

/// Timestamp format accepted by the `lastMod*Date` parameters (UTC, whole seconds)
pub const NVD_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One page of feed results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    /// Total matches for the window across all pages
    pub total_results: u32,
    /// Page size the feed used (0 if it did not say)
    pub page_size: u32,
    /// Raw vulnerability items in feed order
    pub items: Vec<Value>,
}

impl PageResult {
    /// The "nothing changed in this window" result
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A paginated source of vulnerability records
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the page starting at `offset` for records modified within `window`
    async fn fetch_page(&self, window: &TimeWindow, offset: u32) -> Result<PageResult>;
}

/// Settings for [`NvdClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub results_per_page: u32,
    pub request_timeout: Duration,
    /// Extra sleep after HTTP 429 before the failure is reported
    pub rate_limit_cooldown: Duration,
    pub max_requests_per_30s: u32,
}

impl ClientSettings {
    pub fn from_config(config: &NvdConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            user_agent: config.user_agent.clone(),
            results_per_page: config.results_per_page,
            request_timeout: Duration::from_secs(u64::from(config.request_timeout_seconds)),
            rate_limit_cooldown: Duration::from_secs(u64::from(
                config.rate_limit_cooldown_seconds,
            )),
            max_requests_per_30s: config.effective_rate_limit(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&NvdConfig::default())
    }
}

/// NVD API client
pub struct NvdClient {
    http: Client,
    settings: ClientSettings,
    limiter: Arc<RateLimiter>,
}

impl NvdClient {
    /// Create a client with its own rate limiter
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(settings.max_requests_per_30s));
        Self::with_rate_limiter(settings, limiter)
    }

    /// Create a client sharing an existing rate limiter
    pub fn with_rate_limiter(settings: ClientSettings, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            settings,
            limiter,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn query(&self, window: &TimeWindow, offset: u32) -> [(&'static str, String); 4] {
        [
            ("lastModStartDate", format_nvd_timestamp(window.start)),
            ("lastModEndDate", format_nvd_timestamp(window.end)),
            ("startIndex", offset.to_string()),
            ("resultsPerPage", self.settings.results_per_page.to_string()),
        ]
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::ConnectionTimeout {
                endpoint: self.settings.api_url.clone(),
            }
        } else {
            Error::Transport(format!("Failed to fetch NVD data: {}", e))
        }
    }
}

#[async_trait]
impl FeedSource for NvdClient {
    async fn fetch_page(&self, window: &TimeWindow, offset: u32) -> Result<PageResult> {
        self.limiter.acquire().await;

        debug!("Fetching CVEs modified in {} from offset {}", window, offset);

        let mut request = self
            .http
            .get(&self.settings.api_url)
            .query(&self.query(window, offset));

        if let Some(ref key) = self.settings.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("No CVEs modified in {}", window);
            return Ok(PageResult::empty());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let cooldown = self.settings.rate_limit_cooldown;
            warn!(
                "Rate limited by NVD API, cooling down for {}s",
                cooldown.as_secs()
            );
            tokio::time::sleep(cooldown).await;
            return Err(Error::RateLimited {
                retry_after_seconds: u32::try_from(cooldown.as_secs()).unwrap_or(u32::MAX),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        parse_page(&body)
    }
}

/// Format a window bound for the `lastMod*Date` parameters
pub fn format_nvd_timestamp(t: DateTime<Utc>) -> String {
    t.format(NVD_TIMESTAMP_FORMAT).to_string()
}

/// Parse a CVE API response body
///
/// The body must be a JSON object; serde would otherwise accept an array
/// and fill the envelope fields by position.
pub fn parse_page(body: &str) -> Result<PageResult> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("Failed to parse NVD response: {}", e)))?;
    if !value.is_object() {
        return Err(Error::Parse(String::from(
            "Failed to parse NVD response: expected a JSON object",
        )));
    }
    let data: NvdResponse = serde_json::from_value(value)
        .map_err(|e| Error::Parse(format!("Failed to parse NVD response: {}", e)))?;

    Ok(PageResult {
        total_results: data.total_results,
        page_size: data.results_per_page,
        items: data.vulnerabilities,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// NVD API response envelope; items stay raw
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdResponse {
    #[serde(default)]
    results_per_page: u32,
    #[serde(default)]
    total_results: u32,
    #[serde(default)]
    vulnerabilities: Vec<Value>,
}
