//! Transaction log for file placements
//!
//! Every move is recorded as `pending` before the filesystem is touched and
//! flipped to `committed` or `failed` afterwards. A `pending` record whose
//! destination never materialized is the trail a crash leaves behind.

use super::store::{load_json, save_json, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Lifecycle of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Written before the filesystem mutation
    Pending,
    /// The mutation completed
    Committed,
    /// The mutation failed; the source was left in place
    Failed,
}

/// Kind of filesystem action a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionAction {
    Move,
}

/// Information needed to reverse a committed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPayload {
    pub original_path: PathBuf,
}

/// A single durable before/after log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub action: TransactionAction,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
    pub rollback: RollbackPayload,
    /// Failure reason, set when `status` is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionRecord {
    /// Create a pending move record
    pub fn pending_move(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            rollback: RollbackPayload {
                original_path: source.clone(),
            },
            source,
            destination,
            action: TransactionAction::Move,
            status: TransactionStatus::Pending,
            timestamp: Utc::now(),
            error: None,
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Outcome of reconciling pending records after a restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub committed: usize,
    pub failed: usize,
}

/// Ordered transaction log, optionally backed by a JSON file
#[derive(Debug)]
pub struct TransactionLog {
    path: PathBuf,
    records: Vec<TransactionRecord>,
}

impl TransactionLog {
    /// Load the log at `path`, dropping records that fail to parse.
    ///
    /// A file that is not a JSON array at all is set aside as
    /// `<name>.corrupt` and the log starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw: Vec<serde_json::Value> = match load_json(&path) {
            Ok(raw) => raw.unwrap_or_default(),
            Err(StoreError::Parse { source, .. }) => {
                let corrupt = corrupt_path(&path);
                tracing::error!(
                    path = %path.display(),
                    "Transaction log unreadable ({}), starting empty",
                    source
                );
                if let Err(e) = fs::rename(&path, &corrupt) {
                    tracing::warn!(
                        path = %corrupt.display(),
                        "Could not set aside corrupt log: {}",
                        e
                    );
                }
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let total = raw.len();

        let records: Vec<TransactionRecord> = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();

        if records.len() < total {
            tracing::warn!(
                path = %path.display(),
                dropped = total - records.len(),
                "Dropped malformed transaction records"
            );
        }

        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record and return its id
    pub fn append(&mut self, record: TransactionRecord) -> Uuid {
        let id = record.id;
        self.records.push(record);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Move a record to a terminal status. Returns false if the id is unknown.
    pub fn mark(&mut self, id: Uuid, status: TransactionStatus, error: Option<String>) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.status = status;
                record.error = error;
                true
            }
            None => false,
        }
    }

    /// Most recent committed record, if any
    pub fn last_committed(&self) -> Option<&TransactionRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.status == TransactionStatus::Committed)
    }

    /// Remove a record, returning it
    pub fn remove(&mut self, id: Uuid) -> Option<TransactionRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Records still `pending`, oldest first
    pub fn pending(&self) -> Vec<&TransactionRecord> {
        self.records
            .iter()
            .filter(|r| r.status == TransactionStatus::Pending)
            .collect()
    }

    /// Resolve `pending` records left behind by a crash.
    ///
    /// A record whose destination exists while its source does not is marked
    /// committed; anything else is marked failed.
    pub fn recover(&mut self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for record in self
            .records
            .iter_mut()
            .filter(|r| r.status == TransactionStatus::Pending)
        {
            if record.destination.exists() && !record.source.exists() {
                record.status = TransactionStatus::Committed;
                report.committed += 1;
            } else {
                record.status = TransactionStatus::Failed;
                record.error = Some("interrupted before completion".to_string());
                report.failed += 1;
            }
        }

        report
    }

    /// Persist the full log
    pub fn save(&self) -> Result<(), StoreError> {
        save_json(&self.path, &self.records)
    }
}
