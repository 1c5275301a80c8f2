//! File Ledger
//!
//! Persistent SQLite index keyed by content hash (SHA-256), so a file can be
//! found again after it has been moved or renamed.

use crate::wal::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Status recorded for files placed by the pipeline
pub const STATUS_PROCESSED: &str = "processed";

/// One ledger row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub content_hash: String,
    pub current_path: PathBuf,
    pub status: String,
    pub last_seen: DateTime<Utc>,
    pub size_bytes: Option<u64>,
    pub mime_type: Option<String>,
}

/// SQLite-backed content-hash → location index
pub struct FileLedger {
    db_path: PathBuf,
}

impl FileLedger {
    /// Open or create the ledger database
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Read {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Self::connect(&db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS file_index (
                content_hash TEXT PRIMARY KEY,
                current_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'processed',
                last_seen TEXT NOT NULL,
                size_bytes INTEGER,
                mime_type TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_current_path ON file_index(current_path);
            "#,
        )?;

        Ok(Self { db_path })
    }

    fn connect(path: &Path) -> Result<rusqlite::Connection, StoreError> {
        Ok(rusqlite::Connection::open(path)?)
    }

    /// Compute SHA-256 hash of file content
    pub fn hash_file(path: &Path) -> Result<String, StoreError> {
        let read_err = |source: std::io::Error| StoreError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(read_err)?;

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = file.read(&mut buffer).map_err(read_err)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Record `path` (hashed now) as the current location of its content
    pub fn record(&self, path: &Path, mime_type: Option<&str>) -> Result<LedgerEntry, StoreError> {
        let hash = Self::hash_file(path)?;
        let size = std::fs::metadata(path).ok().map(|m| m.len());

        let entry = LedgerEntry {
            content_hash: hash,
            current_path: path.to_path_buf(),
            status: STATUS_PROCESSED.to_string(),
            last_seen: Utc::now(),
            size_bytes: size,
            mime_type: mime_type.map(str::to_string),
        };
        self.upsert(&entry)?;
        Ok(entry)
    }

    /// Insert or replace an entry
    pub fn upsert(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let conn = Self::connect(&self.db_path)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO file_index
            (content_hash, current_path, status, last_seen, size_bytes, mime_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                entry.content_hash,
                entry.current_path.to_string_lossy().to_string(),
                entry.status,
                entry.last_seen.to_rfc3339(),
                entry.size_bytes.map(|s| s as i64),
                entry.mime_type,
            ],
        )?;
        Ok(())
    }

    /// Entry for a content hash
    pub fn lookup(&self, hash: &str) -> Result<Option<LedgerEntry>, StoreError> {
        let conn = Self::connect(&self.db_path)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT content_hash, current_path, status, last_seen, size_bytes, mime_type
            FROM file_index
            WHERE content_hash = ?
            "#,
        )?;

        let entry = stmt
            .query_row([hash], |row| {
                let last_seen: String = row.get(3)?;
                Ok(LedgerEntry {
                    content_hash: row.get(0)?,
                    current_path: PathBuf::from(row.get::<_, String>(1)?),
                    status: row.get(2)?,
                    last_seen: DateTime::parse_from_rfc3339(&last_seen)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    size_bytes: row.get::<_, Option<i64>>(4)?.map(|s| s as u64),
                    mime_type: row.get(5)?,
                })
            })
            .optional()?;

        Ok(entry)
    }

    /// Entry for the current content of `path`
    pub fn lookup_file(&self, path: &Path) -> Result<Option<LedgerEntry>, StoreError> {
        self.lookup(&Self::hash_file(path)?)
    }

    /// Number of tracked files
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = Self::connect(&self.db_path)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM file_index", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
