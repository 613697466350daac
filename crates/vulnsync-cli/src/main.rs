//! VulnSync CLI - local vulnerability database maintenance
//!
//! This is the entry point for the `vulnsync` binary.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use vulnsync_common::{Config, LogConfig};
use vulnsync_core::RecordStore;
use vulnsync_db::{TtlCache, VulnDb};
use vulnsync_nvd::{ClientSettings, NvdClient, NvdSync, RetryPolicy, SyncSettings};

/// VulnSync - incremental NVD mirror
#[derive(Parser, Debug)]
#[command(name = "vulnsync")]
#[command(author = "Forge Cyber Defense")]
#[command(version)]
#[command(about = "Incremental vulnerability feed sync", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "vulnsync.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error), overrides config
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact), overrides config
    #[arg(long)]
    log_format: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull CVEs modified since the last sync
    NvdSync {
        /// ISO 8601 start time (default: last checkpoint, else one day ago)
        #[arg(long)]
        since: Option<String>,

        /// ISO 8601 end time (default: now)
        #[arg(long)]
        until: Option<String>,
    },

    /// Show record count and sync checkpoint
    Status,

    /// Print a cached lookup if it is still fresh
    CacheGet {
        /// Cache namespace (osv, kev, epss)
        namespace: String,
        /// Package or CVE key
        key: String,
        /// Version
        version: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };
    let mut config = config.merge_env();
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }
    if args.debug {
        config.logging.level = String::from("debug");
    }
    if let Some(format) = args.log_format.clone() {
        config.logging.format = format;
    }
    config.validate()?;

    let mut log_config = LogConfig::from(&config.logging);
    if args.debug {
        log_config = log_config.with_spans();
    }
    vulnsync_common::init_logging_with_config(log_config);
    info!("VulnSync {} starting", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(
        VulnDb::open(&config.database.path)
            .with_context(|| format!("Failed to open database {}", config.database.path))?,
    );

    match args.command {
        Command::NvdSync { since, until } => nvd_sync(&config, db, since, until).await,
        Command::Status => status(&db),
        Command::CacheGet {
            namespace,
            key,
            version,
        } => cache_get(&config, &db, &namespace, &key, &version),
    }
}

async fn nvd_sync(
    config: &Config,
    db: Arc<VulnDb>,
    since: Option<String>,
    until: Option<String>,
) -> Result<()> {
    let settings = ClientSettings::from_config(&config.nvd);
    if config.nvd.api_key.is_some() {
        println!(
            "Using API key, rate limit: {}/30s",
            settings.max_requests_per_30s
        );
    } else {
        println!(
            "No API key - rate limit: {}/30s",
            settings.max_requests_per_30s
        );
        println!("Get a free key at: https://nvd.nist.gov/developers/request-an-api-key");
    }

    let since = since.as_deref().map(parse_cli_time).transpose()?;
    let until = until.as_deref().map(parse_cli_time).transpose()?;
    println!(
        "Syncing from {} to {}",
        since.map_or_else(|| String::from("last checkpoint"), |t| t.to_rfc3339()),
        until.map_or_else(|| String::from("now"), |t| t.to_rfc3339())
    );

    let client = Arc::new(NvdClient::new(settings)?);
    let sync = NvdSync::new(client, db)
        .with_retry(RetryPolicy::from_config(&config.retry))
        .with_settings(SyncSettings::from_config(&config.nvd));

    match sync.sync_delta(since, until).await {
        Ok(stats) => {
            println!(
                "Sync complete: {} CVEs, {} pages",
                stats.records, stats.pages
            );
            Ok(())
        }
        Err(e) => {
            println!("Sync failed: {}", e);
            if e.is_rate_limited() {
                println!("You're being rate limited. Try:");
                println!("   1. Get a free NVD API key (see link above)");
                println!("   2. Set it: export NVD_API_KEY=your_key_here");
                println!("   3. Or wait a few minutes and try again");
            }
            Err(e).context("NVD sync failed")
        }
    }
}

fn status(db: &VulnDb) -> Result<()> {
    let count = db.record_count()?;
    let checkpoint = db
        .get_meta(vulnsync_nvd::CHECKPOINT_KEY)?
        .unwrap_or_else(|| String::from("never"));

    println!("Records:      {}", count);
    println!("Synced up to: {}", checkpoint);
    Ok(())
}

fn cache_get(
    config: &Config,
    db: &VulnDb,
    namespace: &str,
    key: &str,
    version: &str,
) -> Result<()> {
    let cache = TtlCache::with_ttl_hours(db.clone(), config.cache.ttl_hours(namespace));

    match cache.get(namespace, key, version)? {
        Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
        None => println!("No fresh cache entry for {}:{}@{}", namespace, key, version),
    }
    Ok(())
}

/// Parse a CLI timestamp; naive values are taken as UTC
fn parse_cli_time(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    anyhow::bail!("Invalid timestamp {:?}, expected ISO 8601", s)
}
