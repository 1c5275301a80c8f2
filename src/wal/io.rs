//! Safe I/O utilities for persisted state
//!
//! Provides crash-safe file operations including:
//! - Atomic writes with fsync
//! - Directory synchronization
//! - Advisory locking around read-modify-write cycles
//! - Symlink detection
//!
//! The atlas index, semantic memory, transaction log and settings file are
//! all written through [`atomic_write`], so a crash mid-save leaves either the
//! previous or the new file on disk, never a torn one.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for safe I/O operations
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SafeIoError {
    pub message: String,
    pub kind: SafeIoErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeIoErrorKind {
    WriteError,
    ReadError,
    SyncError,
    RenameError,
    PathError,
    SymlinkError,
    LockError,
}

impl SafeIoError {
    fn new(kind: SafeIoErrorKind, message: String) -> Self {
        Self { message, kind }
    }
}

/// Write data to a file atomically with fsync
///
/// This function:
/// 1. Writes data to a temporary file in the same directory
/// 2. Calls fsync on the file to ensure data is on disk
/// 3. Atomically renames the temp file to the target
/// 4. Syncs the directory to ensure the rename is durable
///
/// If any step fails, the temporary file is cleaned up.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), SafeIoError> {
    let parent = path.parent().ok_or_else(|| {
        SafeIoError::new(
            SafeIoErrorKind::PathError,
            format!("Cannot determine parent directory for: {}", path.display()),
        )
    })?;

    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| {
            SafeIoError::new(
                SafeIoErrorKind::WriteError,
                format!("Failed to create directory {}: {}", parent.display(), e),
            )
        })?;
    }

    let temp_name = format!(
        ".{}.tmp.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string()),
        std::process::id()
    );
    let temp_path = parent.join(&temp_name);

    let write_result = (|| -> Result<(), SafeIoError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                SafeIoError::new(
                    SafeIoErrorKind::WriteError,
                    format!("Failed to create temp file {}: {}", temp_path.display(), e),
                )
            })?;

        file.write_all(data).map_err(|e| {
            SafeIoError::new(
                SafeIoErrorKind::WriteError,
                format!("Failed to write to temp file: {}", e),
            )
        })?;

        file.sync_all().map_err(|e| {
            SafeIoError::new(
                SafeIoErrorKind::SyncError,
                format!("Failed to sync temp file: {}", e),
            )
        })
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(SafeIoError::new(
            SafeIoErrorKind::RenameError,
            format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ),
        ));
    }

    sync_directory(parent)
}

/// Sync a directory to ensure metadata changes are durable
///
/// On POSIX systems, this opens the directory and calls fsync.
/// On Windows the rename itself is atomic on NTFS, so this is a no-op.
pub fn sync_directory(path: &Path) -> Result<(), SafeIoError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(path)
            .map_err(|e| {
                SafeIoError::new(
                    SafeIoErrorKind::SyncError,
                    format!("Failed to open directory {}: {}", path.display(), e),
                )
            })?;

        dir.sync_all().map_err(|e| {
            SafeIoError::new(
                SafeIoErrorKind::SyncError,
                format!("Failed to sync directory {}: {}", path.display(), e),
            )
        })?;
    }

    #[cfg(windows)]
    {
        let _ = path;
    }

    Ok(())
}

/// Path of the advisory lock file guarding `path`.
fn lock_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{}.lock", name))
}

/// Run `f` while holding an exclusive advisory lock for `path`.
///
/// The lock lives in a sibling `.<name>.lock` file so that the atomic rename
/// of the data file does not invalidate it. Rebuild-then-save sequences from
/// more than one process serialize on this lock.
pub fn with_exclusive_lock<T>(
    path: &Path,
    f: impl FnOnce() -> Result<T, SafeIoError>,
) -> Result<T, SafeIoError> {
    let lock_path = lock_path_for(path);
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SafeIoError::new(
                SafeIoErrorKind::LockError,
                format!("Failed to create directory {}: {}", parent.display(), e),
            )
        })?;
    }

    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| {
            SafeIoError::new(
                SafeIoErrorKind::LockError,
                format!("Failed to open lock file {}: {}", lock_path.display(), e),
            )
        })?;

    lock_file.lock_exclusive().map_err(|e| {
        SafeIoError::new(
            SafeIoErrorKind::LockError,
            format!("Failed to lock {}: {}", lock_path.display(), e),
        )
    })?;

    let result = f();
    let _ = FileExt::unlock(&lock_file);
    result
}

/// Check if a path is a symlink without following it
pub fn is_symlink(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.is_symlink(),
        Err(_) => false,
    }
}

/// Ensure a path is not a symlink before operating on it
pub fn ensure_not_symlink(path: &Path, operation: &str) -> Result<(), SafeIoError> {
    if is_symlink(path) {
        return Err(SafeIoError::new(
            SafeIoErrorKind::SymlinkError,
            format!("Refusing to {} symlink: {}", operation, path.display()),
        ));
    }
    Ok(())
}

/// Read up to `limit` bytes of a file, refusing to follow symlinks
pub fn safe_read_prefix(path: &Path, limit: usize) -> Result<Vec<u8>, SafeIoError> {
    use std::io::Read;

    ensure_not_symlink(path, "read")?;

    let file = File::open(path).map_err(|e| {
        SafeIoError::new(
            SafeIoErrorKind::ReadError,
            format!("Failed to open {}: {}", path.display(), e),
        )
    })?;

    let mut buffer = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64).read_to_end(&mut buffer).map_err(|e| {
        SafeIoError::new(
            SafeIoErrorKind::ReadError,
            format!("Failed to read {}: {}", path.display(), e),
        )
    })?;

    Ok(buffer)
}
