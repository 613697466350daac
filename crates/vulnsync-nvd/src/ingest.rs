//! Turning raw NVD items into stored records

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;
use vulnsync_core::{Record, RecordStore, Result};

/// Source tag stored with every NVD record
pub const NVD_SOURCE: &str = "NVD";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Build a record from a raw `vulnerabilities[]` item.
///
/// Returns `None` when the CVE id or the last-modified time is missing.
pub fn extract_record(item: &Value) -> Option<Record> {
    let cve = item.get("cve");
    let id = cve.and_then(|c| non_empty_str(c.get("id")))?;
    let last_modified = cve
        .and_then(|c| non_empty_str(c.get("lastModified")))
        .or_else(|| non_empty_str(item.get("lastModified")))?;

    Some(Record {
        id: id.to_string(),
        source: NVD_SOURCE.to_string(),
        modified: normalize_timestamp(last_modified),
        payload: item.clone(),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Normalize a feed timestamp to RFC 3339 UTC with a `Z` suffix.
///
/// Values already ending in `Z` are kept verbatim, naive values are read as
/// UTC, offset values are converted to UTC, and anything unparseable is
/// returned unchanged.
///
/// Fractional seconds keep only their significant digits (`.123Z`), so the
/// stored `modified` strings are not byte-identical to those of older mirrors
/// that relabelled offsets as UTC and padded to microseconds.
pub fn normalize_timestamp(value: &str) -> String {
    if value.ends_with('Z') {
        return value.to_string();
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return canonical(t.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return canonical(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return canonical(Utc.from_utc_datetime(&midnight));
    }

    value.to_string()
}

fn canonical(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Persist one page of raw items as a single transaction.
///
/// Items without an id or last-modified time are skipped. Returns the number
/// of records written.
pub fn save_vulnerabilities(store: &dyn RecordStore, items: &[Value]) -> Result<usize> {
    let records: Vec<Record> = items
        .iter()
        .filter_map(|item| {
            let record = extract_record(item);
            if record.is_none() {
                debug!("Skipping NVD item without id or lastModified");
            }
            record
        })
        .collect();

    if records.is_empty() {
        return Ok(0);
    }

    store.upsert_records(&records)
}
