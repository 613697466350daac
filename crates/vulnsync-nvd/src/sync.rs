//! NVD delta sync - pull CVEs modified since the last checkpoint
//!
//! A sync resolves a `[start, end)` range, cuts it into windows the API will
//! accept, pages through each window and upserts every page as its own
//! transaction. The checkpoint only moves to `end` once every window has
//! finished, so a failed or cancelled sync is simply repeated next time.

use crate::client::{FeedSource, PageResult};
use crate::ingest::save_vulnerabilities;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vulnsync_common::NvdConfig;
use vulnsync_core::{Clock, RecordStore, Result, SystemClock, TimeWindow};

/// Metadata key holding the sync checkpoint
pub const CHECKPOINT_KEY: &str = "nvd_last_mod";

/// Page size assumed when the feed does not report one
pub const DEFAULT_PAGE_SIZE: u32 = 2000;

/// Tunables for [`NvdSync`]
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Widest window sent to the feed in one query
    pub max_window: Duration,
    /// How far back to start when there is no checkpoint
    pub default_lookback: Duration,
    /// Offset step when a page omits its size
    pub default_page_size: u32,
}

impl SyncSettings {
    pub fn from_config(config: &NvdConfig) -> Self {
        Self {
            max_window: Duration::days(i64::from(config.max_days_per_request)),
            default_lookback: Duration::hours(i64::from(config.default_lookback_hours)),
            default_page_size: if config.results_per_page == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                config.results_per_page
            },
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_window: Duration::days(7),
            default_lookback: Duration::days(1),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Sync statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records written to the store
    pub records: u64,
    /// Pages fetched, including empty ones
    pub pages: u32,
    /// Windows completed
    pub windows: u32,
    /// Items dropped for missing id or lastModified
    pub skipped: u64,
}

/// NVD delta synchronizer
pub struct NvdSync {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn RecordStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl NvdSync {
    /// Create a synchronizer with default retry policy, settings and system clock
    pub fn new(feed: Arc<dyn FeedSource>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            feed,
            store,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            settings: SyncSettings::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The persisted "synced up to" time, if any.
    ///
    /// An unreadable value is treated as no checkpoint.
    pub fn last_checkpoint(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get_meta(CHECKPOINT_KEY)? else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&raw) {
            Ok(t) => Ok(Some(t.with_timezone(&Utc))),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {:?}: {}", raw, e);
                Ok(None)
            }
        }
    }

    /// Sync CVEs modified in `[since, until)`.
    ///
    /// `since` defaults to the checkpoint, then to `now - default_lookback`;
    /// `until` defaults to now. An empty or inverted range does nothing.
    pub async fn sync_delta(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<SyncStats> {
        let now = self.clock.now();
        let start = match since {
            Some(t) => t,
            None => self
                .last_checkpoint()?
                .unwrap_or(now - self.settings.default_lookback),
        };
        let end = until.unwrap_or(now);
        let range = TimeWindow::new(start, end);

        let mut stats = SyncStats::default();
        if range.is_empty() {
            info!("Nothing to sync for {}", range);
            return Ok(stats);
        }

        let windows = range.split(self.settings.max_window);
        info!(
            "Starting NVD delta sync for {} in {} window(s)",
            range,
            windows.len()
        );

        for window in &windows {
            self.sync_window(window, &mut stats).await?;
            stats.windows += 1;
        }

        self.advance_checkpoint(end)?;

        info!(
            "NVD sync complete: {} CVEs in {} pages ({} skipped)",
            stats.records, stats.pages, stats.skipped
        );
        Ok(stats)
    }

    #[tracing::instrument(skip_all, fields(window = %window))]
    async fn sync_window(&self, window: &TimeWindow, stats: &mut SyncStats) -> Result<()> {
        let mut offset: u32 = 0;
        let mut total_results: u32 = 0;

        loop {
            let page: PageResult = self
                .retry
                .run(|| self.feed.fetch_page(window, offset))
                .await?;
            stats.pages += 1;

            if total_results == 0 {
                total_results = page.total_results;
            }

            if page.items.is_empty() {
                debug!("Empty page at offset {} for {}", offset, window);
                break;
            }

            let saved = save_vulnerabilities(self.store.as_ref(), &page.items)?;
            stats.records += saved as u64;
            stats.skipped += (page.items.len() - saved) as u64;

            let page_size = if page.page_size == 0 {
                self.settings.default_page_size
            } else {
                page.page_size
            };

            info!(
                "Processed {}/{} CVEs for {}",
                offset.saturating_add(page_size).min(total_results),
                total_results,
                window
            );

            if offset.saturating_add(page_size) >= total_results {
                break;
            }
            offset += page_size;
        }

        Ok(())
    }

    fn advance_checkpoint(&self, end: DateTime<Utc>) -> Result<()> {
        if let Some(current) = self.last_checkpoint()? {
            if current >= end {
                debug!(
                    "Checkpoint {} is already past {}, leaving it",
                    current.to_rfc3339(),
                    end.to_rfc3339()
                );
                return Ok(());
            }
        }

        self.store
            .set_meta(CHECKPOINT_KEY, &end.to_rfc3339_opts(SecondsFormat::AutoSi, true))?;
        debug!("Checkpoint advanced to {}", end.to_rfc3339());
        Ok(())
    }
}
