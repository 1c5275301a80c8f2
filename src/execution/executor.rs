//! Transactional Executor
//!
//! Turns a placement decision into a safe, reversible move:
//! 1. resolve name collisions (`report.pdf` → `report_v2.pdf`)
//! 2. persist a `pending` record
//! 3. rename (copy + delete across filesystems)
//! 4. mark the record `committed` or `failed`
//!
//! Destinations are remembered for a short cooldown so the watcher does not
//! re-ingest files the system just placed.

use crate::security::PathValidator;
use crate::wal::{
    ensure_not_symlink, RecoveryReport, SafeIoError, StoreError, TransactionLog, TransactionRecord,
    TransactionStatus,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// How long a placed file is ignored by the watcher
pub const RECENTLY_MOVED_COOLDOWN: Duration = Duration::from_secs(10);

/// Errors surfaced by the executor
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Source not found: {0}")]
    SourceMissing(PathBuf),

    #[error("{0}")]
    Rejected(String),

    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Cannot undo {id}: {reason}")]
    UndoConflict { id: Uuid, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] SafeIoError),

    #[error("Transaction log lock poisoned")]
    Poisoned,
}

/// Result of a successful (or simulated) move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub transaction_id: Uuid,
    pub source: PathBuf,
    /// Collision-resolved final path
    pub destination: PathBuf,
    pub dry_run: bool,
}

/// First free path for `target`: the path itself, else `stem_v2.ext`,
/// `stem_v3.ext`, ...
pub fn resolve_collision(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = target.extension().map(|e| e.to_string_lossy().to_string());

    let mut counter = 2u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_v{}.{}", stem, counter, ext),
            None => format!("{}_v{}", stem, counter),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, falling back to copy + delete (e.g. across filesystems). A copy
/// whose source cannot be removed is rolled back so the file exists in
/// exactly one place. Never replaces an existing destination.
fn relocate(source: &Path, destination: &Path) -> io::Result<()> {
    // Another process may have claimed the name since collision resolution
    if destination.symlink_metadata().is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", destination.display()),
        ));
    }

    let rename_err = match fs::rename(source, destination) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !source.is_file() {
        return Err(rename_err);
    }

    tracing::debug!("Rename failed ({}), falling back to copy", rename_err);
    copy_new(source, destination)?;
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

/// Copy into a file that must not exist yet
fn copy_new(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(source)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    if let Err(e) = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all()) {
        drop(writer);
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Collision-aware mover backed by a transaction log
pub struct TransactionalExecutor {
    log: Mutex<TransactionLog>,
    recently_moved: Mutex<HashMap<PathBuf, Instant>>,
    cooldown: Duration,
    dry_run: bool,
}

impl TransactionalExecutor {
    /// Open the transaction log at `log_path`
    pub fn open(log_path: impl Into<PathBuf>, dry_run: bool) -> Result<Self, StoreError> {
        let log = TransactionLog::open(log_path)?;
        if dry_run {
            tracing::info!("[Executor] Dry run: no files will be moved");
        }

        Ok(Self {
            log: Mutex::new(log),
            recently_moved: Mutex::new(HashMap::new()),
            cooldown: RECENTLY_MOVED_COOLDOWN,
            dry_run,
        })
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn log(&self) -> Result<MutexGuard<'_, TransactionLog>, ExecutionError> {
        self.log.lock().map_err(|_| ExecutionError::Poisoned)
    }

    /// Snapshot of every record, oldest first
    pub fn history(&self) -> Vec<TransactionRecord> {
        self.log().map(|log| log.records().to_vec()).unwrap_or_default()
    }

    /// Records left `pending` by an interrupted run
    pub fn pending(&self) -> Vec<TransactionRecord> {
        self.log()
            .map(|log| log.pending().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Move `source` into `dest_folder`.
    ///
    /// The pending record is persisted before the filesystem is touched. On
    /// failure the record is marked `failed` and the source stays where it
    /// was.
    pub fn move_file(&self, source: &Path, dest_folder: &Path) -> Result<MoveOutcome, ExecutionError> {
        if !source.exists() {
            return Err(ExecutionError::SourceMissing(source.to_path_buf()));
        }
        ensure_not_symlink(source, "move")?;
        PathValidator::validate_move(source, dest_folder).map_err(ExecutionError::Rejected)?;

        let file_name = source
            .file_name()
            .ok_or_else(|| ExecutionError::Rejected(format!("No file name: {}", source.display())))?;
        let destination = resolve_collision(&dest_folder.join(file_name));

        let record = TransactionRecord::pending_move(source.to_path_buf(), destination.clone());
        let id = record.id;

        if self.dry_run {
            let mut log = self.log()?;
            log.append(record);
            log.mark(id, TransactionStatus::Committed, None);
            tracing::info!(
                "[DRY RUN] Would move {} -> {}",
                source.display(),
                destination.display()
            );
            drop(log);
            self.remember(&destination);
            return Ok(MoveOutcome {
                transaction_id: id,
                source: source.to_path_buf(),
                destination,
                dry_run: true,
            });
        }

        {
            let mut log = self.log()?;
            log.append(record);
            if let Err(e) = log.save() {
                log.remove(id);
                return Err(e.into());
            }
        }

        let result = fs::create_dir_all(dest_folder).and_then(|_| relocate(source, &destination));

        let mut log = self.log()?;
        match result {
            Ok(()) => {
                log.mark(id, TransactionStatus::Committed, None);
                if let Err(e) = log.save() {
                    tracing::warn!("[Executor] Failed to persist committed record {}: {}", id, e);
                }
                drop(log);

                self.remember(&destination);
                tracing::info!("Moved {} -> {}", source.display(), destination.display());
                Ok(MoveOutcome {
                    transaction_id: id,
                    source: source.to_path_buf(),
                    destination,
                    dry_run: false,
                })
            }
            Err(e) => {
                log.mark(id, TransactionStatus::Failed, Some(e.to_string()));
                if let Err(save_err) = log.save() {
                    tracing::warn!("[Executor] Failed to persist failed record {}: {}", id, save_err);
                }
                tracing::error!("Move failed: {} -> {}: {}", source.display(), destination.display(), e);
                Err(ExecutionError::Move {
                    from: source.to_path_buf(),
                    to: destination,
                    source: e,
                })
            }
        }
    }

    /// `move_file` reduced to success or failure
    pub fn move_to(&self, source: &Path, dest_folder: &Path) -> bool {
        self.move_file(source, dest_folder).is_ok()
    }

    /// Reverse the most recent committed move.
    ///
    /// Only proceeds when the destination still exists and the original path
    /// is free; otherwise nothing is changed. On success the record is
    /// removed from the log.
    pub fn try_undo_last(&self) -> Result<TransactionRecord, ExecutionError> {
        let mut log = self.log()?;
        let record = log.last_committed().cloned().ok_or(ExecutionError::NothingToUndo)?;
        let original = &record.rollback.original_path;

        if !record.destination.exists() {
            return Err(ExecutionError::UndoConflict {
                id: record.id,
                reason: format!("{} no longer exists", record.destination.display()),
            });
        }
        if original.exists() {
            return Err(ExecutionError::UndoConflict {
                id: record.id,
                reason: format!("{} is occupied", original.display()),
            });
        }

        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| ExecutionError::Move {
                from: record.destination.clone(),
                to: original.clone(),
                source: e,
            })?;
        }
        relocate(&record.destination, original).map_err(|e| ExecutionError::Move {
            from: record.destination.clone(),
            to: original.clone(),
            source: e,
        })?;

        log.remove(record.id);
        if let Err(e) = log.save() {
            tracing::warn!("[Executor] Failed to persist undo of {}: {}", record.id, e);
        }
        drop(log);

        self.remember(original);
        tracing::info!("Undid move: {} -> {}", record.destination.display(), original.display());
        Ok(record)
    }

    /// Reverse the most recent committed move, reporting success
    pub fn undo_last(&self) -> bool {
        match self.try_undo_last() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Undo failed: {}", e);
                false
            }
        }
    }

    /// Reconcile `pending` records and persist the result
    pub fn recover(&self) -> Result<RecoveryReport, ExecutionError> {
        let mut log = self.log()?;
        let report = log.recover();
        if report.committed + report.failed > 0 {
            tracing::info!(
                committed = report.committed,
                failed = report.failed,
                "[Executor] Recovered interrupted transactions"
            );
            if !self.dry_run {
                log.save()?;
            }
        }
        Ok(report)
    }

    fn remember(&self, path: &Path) {
        if let Ok(mut recent) = self.recently_moved.lock() {
            recent.insert(normalize(path), Instant::now());
        }
    }

    /// True if `path` was placed by this executor within the cooldown
    pub fn is_recently_moved(&self, path: &Path) -> bool {
        let Ok(mut recent) = self.recently_moved.lock() else {
            return false;
        };
        let cooldown = self.cooldown;
        recent.retain(|_, at| at.elapsed() < cooldown);
        recent.contains_key(&normalize(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn executor(dir: &Path) -> TransactionalExecutor {
        TransactionalExecutor::open(dir.join("transactions.json"), false).unwrap()
    }

    #[test]
    fn test_collision_suffixes() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("Docs");
        let exec = executor(dir.path());

        for (i, expected) in ["report.pdf", "report_v2.pdf", "report_v3.pdf"].iter().enumerate() {
            let inbox = dir.path().join(format!("inbox{}", i));
            fs::create_dir_all(&inbox).unwrap();
            let src = inbox.join("report.pdf");
            fs::write(&src, format!("version {}", i)).unwrap();

            let outcome = exec.move_file(&src, &dest).unwrap();
            assert_eq!(outcome.destination, dest.join(expected));
            assert!(!src.exists());
        }

        assert_eq!(fs::read_to_string(dest.join("report.pdf")).unwrap(), "version 0");
        assert_eq!(fs::read_to_string(dest.join("report_v3.pdf")).unwrap(), "version 2");
    }

    #[test]
    fn test_resolve_collision_without_extension() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("Makefile");
        assert_eq!(resolve_collision(&target), target);
        fs::write(&target, "").unwrap();
        assert_eq!(resolve_collision(&target), dir.path().join("Makefile_v2"));
    }

    #[test]
    fn test_commit_is_persisted() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "a").unwrap();

        let exec = executor(dir.path());
        let outcome = exec.move_file(&src, &dir.path().join("Docs")).unwrap();

        let log = TransactionLog::open(dir.path().join("transactions.json")).unwrap();
        let record = log.get(outcome.transaction_id).unwrap();
        assert_eq!(record.status, TransactionStatus::Committed);
        assert_eq!(record.rollback.original_path, src);
    }

    #[test]
    fn test_failed_move_leaves_source_and_failed_record() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "keep me").unwrap();
        // A regular file where the destination folder should be
        let blocked = dir.path().join("Blocked");
        fs::write(&blocked, "not a folder").unwrap();

        let exec = executor(dir.path());
        let err = exec.move_file(&src, &blocked).unwrap_err();
        assert!(matches!(err, ExecutionError::Move { .. }));

        assert_eq!(fs::read_to_string(&src).unwrap(), "keep me");
        let history = exec.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Failed);
        assert!(history[0].error.is_some());

        let persisted = TransactionLog::open(dir.path().join("transactions.json")).unwrap();
        assert_eq!(persisted.records()[0].status, TransactionStatus::Failed);
    }

    #[test]
    fn test_relocate_never_replaces_destination() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("report.pdf");
        let dst = dir.path().join("report_v2.pdf");
        fs::write(&src, "incoming").unwrap();
        fs::write(&dst, "claimed meanwhile").unwrap();

        let err = relocate(&src, &dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&src).unwrap(), "incoming");
        assert_eq!(fs::read_to_string(&dst).unwrap(), "claimed meanwhile");
    }

    #[test]
    fn test_copy_new_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, "payload").unwrap();

        copy_new(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");

        fs::write(&src, "second").unwrap();
        assert_eq!(copy_new(&src, &dst).unwrap_err().kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[test]
    fn test_missing_source_writes_no_record() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        let err = exec.move_file(&dir.path().join("ghost.txt"), dir.path()).unwrap_err();
        assert!(matches!(err, ExecutionError::SourceMissing(_)));
        assert!(!exec.move_to(&dir.path().join("ghost.txt"), dir.path()));
        assert!(exec.history().is_empty());
    }

    #[test]
    fn test_undo_on_empty_log() {
        let dir = tempdir().unwrap();
        let exec = executor(dir.path());
        assert!(!exec.undo_last());
        assert!(matches!(exec.try_undo_last(), Err(ExecutionError::NothingToUndo)));
        assert!(!dir.path().join("transactions.json").exists());
    }

    #[test]
    fn test_undo_restores_file_and_removes_record() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("inbox").join("thesis.docx");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "chapter one").unwrap();

        let exec = executor(dir.path());
        let outcome = exec.move_file(&src, &dir.path().join("College")).unwrap();
        assert!(outcome.destination.exists());

        assert!(exec.undo_last());
        assert_eq!(fs::read_to_string(&src).unwrap(), "chapter one");
        assert!(!outcome.destination.exists());
        assert!(exec.history().is_empty());
        assert!(exec.is_recently_moved(&src));
    }

    #[test]
    fn test_undo_refuses_when_original_is_occupied() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "moved").unwrap();

        let exec = executor(dir.path());
        let outcome = exec.move_file(&src, &dir.path().join("Docs")).unwrap();
        fs::write(&src, "new file with the same name").unwrap();

        assert!(!exec.undo_last());
        assert!(outcome.destination.exists());
        assert_eq!(exec.history().len(), 1);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "a").unwrap();
        fs::create_dir(dir.path().join("Docs")).unwrap();
        fs::write(dir.path().join("Docs").join("a.txt"), "existing").unwrap();

        let exec = TransactionalExecutor::open(dir.path().join("transactions.json"), true).unwrap();
        let outcome = exec.move_file(&src, &dir.path().join("Docs")).unwrap();

        assert!(outcome.dry_run);
        assert_eq!(outcome.destination, dir.path().join("Docs").join("a_v2.txt"));
        assert!(src.exists());
        assert!(!outcome.destination.exists());
        assert!(!dir.path().join("transactions.json").exists());
        assert_eq!(exec.history().len(), 1);
    }

    #[test]
    fn test_recently_moved_expires() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "a").unwrap();

        let exec = executor(dir.path()).with_cooldown(Duration::from_millis(50));
        let outcome = exec.move_file(&src, &dir.path().join("Docs")).unwrap();
        assert!(exec.is_recently_moved(&outcome.destination));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!exec.is_recently_moved(&outcome.destination));
    }

    #[test]
    fn test_recover_resolves_pending_records() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("transactions.json");
        let landed_src = dir.path().join("gone.txt");
        let landed_dst = dir.path().join("Docs").join("gone.txt");
        fs::create_dir_all(landed_dst.parent().unwrap()).unwrap();
        fs::write(&landed_dst, "made it").unwrap();
        let stuck_src = dir.path().join("stuck.txt");
        fs::write(&stuck_src, "never moved").unwrap();

        let mut log = TransactionLog::open(&log_path).unwrap();
        log.append(TransactionRecord::pending_move(landed_src, landed_dst));
        log.append(TransactionRecord::pending_move(stuck_src, dir.path().join("Docs").join("stuck.txt")));
        log.save().unwrap();

        let exec = TransactionalExecutor::open(&log_path, false).unwrap();
        assert_eq!(exec.pending().len(), 2);
        let report = exec.recover().unwrap();
        assert_eq!(report, RecoveryReport { committed: 1, failed: 1 });
        assert!(exec.pending().is_empty());

        let reopened = TransactionLog::open(&log_path).unwrap();
        assert!(reopened.pending().is_empty());
    }
}
