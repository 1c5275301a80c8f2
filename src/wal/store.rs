//! JSON persistence for local state files
//!
//! Every persisted structure (atlas index, semantic memory, transaction log)
//! goes through [`save_json`] / [`load_json`]: writes are locked and atomic,
//! reads treat a missing file as "no state yet".

use super::io::{atomic_write, with_exclusive_lock, SafeIoError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while persisting or loading local state
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize state for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] SafeIoError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Serialize `value` and write it atomically under the file's advisory lock.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    with_exclusive_lock(path, || atomic_write(path, &data))?;
    Ok(())
}

/// Load and deserialize `path`, returning `Ok(None)` when it does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<f32>,
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let loaded: Option<Sample> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let sample = Sample {
            name: "Invoices".to_string(),
            values: vec![0.5, 0.25],
        };

        save_json(&path, &sample).unwrap();
        let loaded: Sample = load_json(&path).unwrap().unwrap();

        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_garbage_file_reports_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let result: Result<Option<Sample>, _> = load_json(&path);
        assert!(matches!(result, Err(StoreError::Parse { .. })));
    }
}
