//! SQLite database for synced records, sync metadata and the lookup cache

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use vulnsync_core::{CacheEntry, CacheKey, CacheStore, Error, Record, RecordStore, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS cves (
        cve_id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        json TEXT NOT NULL,
        modified TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS lookup_cache (
        namespace TEXT NOT NULL,
        key TEXT NOT NULL,
        version TEXT NOT NULL,
        fetched_at TEXT NOT NULL,
        json TEXT NOT NULL,
        PRIMARY KEY (namespace, key, version)
    );

    CREATE INDEX IF NOT EXISTS idx_cves_modified ON cves(modified);
"#;

/// Vulnerability database backed by SQLite
#[derive(Clone)]
pub struct VulnDb {
    conn: Arc<Mutex<Connection>>,
}

impl VulnDb {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        // journal_mode returns a row, so it cannot go through execute_batch
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(|e| Error::Database(format!("Failed to enable WAL: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;
        debug!("Opened database at {:?}", path);
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::Database(format!("Failed to create in-memory database: {}", e))
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::Database(format!("Failed to initialize schema: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database(String::from("Database connection mutex poisoned")))
    }

    /// Fetch a stored record by identifier
    pub fn get_record(&self, id: &str) -> Result<Option<Record>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT cve_id, source, json, modified FROM cves WHERE cve_id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to read record {}: {}", id, e)))?;

        match row {
            Some((id, source, json, modified)) => Ok(Some(Record {
                id,
                source,
                modified,
                payload: serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }
}

impl RecordStore for VulnDb {
    fn upsert_records(&self, records: &[Record]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare_cached(
                    r#"
                    INSERT INTO cves (cve_id, source, json, modified)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(cve_id) DO UPDATE SET
                        source = excluded.source,
                        json = excluded.json,
                        modified = excluded.modified
                    "#,
                )
                .map_err(|e| Error::Database(format!("Failed to prepare upsert: {}", e)))?;

            for record in records {
                let json = serde_json::to_string(&record.payload)?;
                stmt.execute(params![record.id, record.source, json, record.modified])
                    .map_err(|e| {
                        Error::Database(format!("Failed to upsert {}: {}", record.id, e))
                    })?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit records: {}", e)))?;
        Ok(records.len())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| Error::Database(format!("Failed to read meta {}: {}", key, e)))
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|e| Error::Database(format!("Failed to write meta {}: {}", key, e)))?;
        Ok(())
    }

    fn record_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cves", [], |row| row.get(0))
            .map_err(|e| Error::Database(format!("Failed to count records: {}", e)))?;
        Ok(count as u64)
    }
}

impl CacheStore for VulnDb {
    fn put_cache_entry(
        &self,
        key: &CacheKey,
        payload: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO lookup_cache (namespace, key, version, fetched_at, json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(namespace, key, version) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                json = excluded.json
            "#,
            params![
                key.namespace,
                key.key,
                key.version,
                fetched_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                payload,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to cache {}: {}", key, e)))?;
        Ok(())
    }

    fn get_cache_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT fetched_at, json FROM lookup_cache
                 WHERE namespace = ?1 AND key = ?2 AND version = ?3",
                params![key.namespace, key.key, key.version],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("Failed to read cache {}: {}", key, e)))?;

        Ok(row.map(|(fetched_at, payload)| CacheEntry {
            payload,
            fetched_at: DateTime::parse_from_rfc3339(&fetched_at)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }))
    }
}
