//! End-to-end delta sync against a mock NVD endpoint and a file-backed store.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use vulnsync_core::{Error, RecordStore};
use vulnsync_db::VulnDb;
use vulnsync_nvd::{ClientSettings, NvdClient, NvdSync, RetryPolicy, CHECKPOINT_KEY};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, d, 0, 0, 0).unwrap()
}

fn nvd_page(total: u32, per_page: u32, start: u32, ids: &[&str]) -> Value {
    let vulnerabilities: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "cve": {
                    "id": id,
                    "lastModified": "2024-08-01T10:30:00.000",
                    "descriptions": [{"lang": "en", "value": "test"}]
                }
            })
        })
        .collect();

    json!({
        "resultsPerPage": per_page,
        "startIndex": start,
        "totalResults": total,
        "format": "NVD_CVE",
        "version": "2.0",
        "vulnerabilities": vulnerabilities
    })
}

fn client_for(server: &MockServer) -> Arc<NvdClient> {
    Arc::new(
        NvdClient::new(ClientSettings {
            api_url: server.uri(),
            results_per_page: 2,
            rate_limit_cooldown: Duration::ZERO,
            max_requests_per_30s: 100,
            request_timeout: Duration::from_secs(5),
            ..ClientSettings::default()
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_sync_pages_into_database() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("startIndex", "0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(nvd_page(3, 2, 0, &["CVE-1", "CVE-2"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("startIndex", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nvd_page(3, 2, 2, &["CVE-3"])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let db = Arc::new(VulnDb::open(dir.path().join("vulnsync.db")).unwrap());
    let sync = NvdSync::new(client_for(&server), db.clone()).with_retry(RetryPolicy::immediate(2));

    let stats = sync.sync_delta(Some(day(1)), Some(day(2))).await.unwrap();

    assert_eq!((stats.records, stats.pages), (3, 2));
    assert_eq!(db.record_count().unwrap(), 3);
    assert_eq!(
        db.get_record("CVE-3").unwrap().unwrap().modified,
        "2024-08-01T10:30:00Z"
    );
    assert_eq!(
        db.get_meta(CHECKPOINT_KEY).unwrap().as_deref(),
        Some("2024-08-02T00:00:00Z")
    );
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(nvd_page(2, 2, 0, &["CVE-1", "CVE-2"])),
        )
        .mount(&server)
        .await;

    let db = Arc::new(VulnDb::in_memory().unwrap());
    let sync = NvdSync::new(client_for(&server), db.clone()).with_retry(RetryPolicy::immediate(2));

    sync.sync_delta(Some(day(1)), Some(day(2))).await.unwrap();
    sync.sync_delta(Some(day(1)), Some(day(2))).await.unwrap();

    assert_eq!(db.record_count().unwrap(), 2);
}

#[tokio::test]
async fn test_recovers_from_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(nvd_page(1, 1, 0, &["CVE-9"])))
        .mount(&server)
        .await;

    let db = Arc::new(VulnDb::in_memory().unwrap());
    let sync = NvdSync::new(client_for(&server), db.clone()).with_retry(RetryPolicy::immediate(3));

    let stats = sync.sync_delta(Some(day(1)), Some(day(2))).await.unwrap();

    assert_eq!((stats.records, stats.pages), (1, 1));
}

#[tokio::test]
async fn test_not_found_means_no_changes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let db = Arc::new(VulnDb::in_memory().unwrap());
    let sync = NvdSync::new(client_for(&server), db.clone()).with_retry(RetryPolicy::immediate(3));

    let stats = sync.sync_delta(Some(day(1)), Some(day(2))).await.unwrap();

    assert_eq!((stats.records, stats.pages), (0, 1));
    assert_eq!(sync.last_checkpoint().unwrap(), Some(day(2)));
}

#[tokio::test]
async fn test_malformed_body_fails_without_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"totalResults\": \"lots\"}"))
        .expect(1)
        .mount(&server)
        .await;

    let db = Arc::new(VulnDb::in_memory().unwrap());
    let sync = NvdSync::new(client_for(&server), db.clone()).with_retry(RetryPolicy::immediate(5));

    let err = sync
        .sync_delta(Some(day(1)), Some(day(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(db.get_meta(CHECKPOINT_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_array_body_fails_without_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[0, 0]"))
        .expect(1)
        .mount(&server)
        .await;

    let db = Arc::new(VulnDb::in_memory().unwrap());
    let sync = NvdSync::new(client_for(&server), db.clone()).with_retry(RetryPolicy::immediate(5));

    let err = sync
        .sync_delta(Some(day(1)), Some(day(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(db.get_meta(CHECKPOINT_KEY).unwrap(), None);
    assert_eq!(db.record_count().unwrap(), 0);
}
