//! Settings
//!
//! Read-only configuration handed to every component at construction time.
//! Resolution order: built-in defaults, then `<data_dir>/config.json`, then
//! `.env` / process environment variables prefixed `SENTINEL_`.

use crate::wal::{atomic_write, SafeIoError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SENTINEL_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    #[error(transparent)]
    Write(#[from] SafeIoError),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Compute and log every decision without touching the filesystem
    pub dry_run: bool,
    /// Directories watched for new files; the first one also hosts
    /// `_Needs_Review` and newly created category folders
    pub watch_directories: Vec<PathBuf>,
    /// Roots walked when building the folder atlas
    pub scan_roots: Vec<PathBuf>,
    /// User-defined category → folder routing
    pub category_map: BTreeMap<String, PathBuf>,
    /// Where the atlas, memory, transaction log and ledger live
    pub data_dir: PathBuf,
    /// Minimum category-description similarity for the semantic voter
    pub classification_threshold: f32,
    /// Below this fused confidence the NLI voter is consulted
    pub escalation_threshold: f32,
    /// Minimum similarity for routing a file into an atlas folder
    pub folder_match_threshold: f32,
    /// Minimum similarity for matching an NLI-suggested name to an atlas folder
    pub nli_folder_match_threshold: f32,
    /// Recall threshold for the history voter
    pub memory_recall_threshold: f32,
    /// Recall threshold for memory lookups inside keyword classification
    pub semantic_memory_threshold: f32,
    /// Capacity of the few-shot memory
    pub max_memory_entries: usize,
    /// Files above this size skip the voting engine
    pub max_file_size_mb: u64,
    /// Length of the session context window
    pub session_window_minutes: i64,
    /// File name patterns never processed (suffixes, or prefixes ending in `*`)
    pub ignore_patterns: Vec<String>,
    /// Maximum folder depth walked by the atlas scan
    pub atlas_max_depth: usize,
    /// Processing idles when available memory drops below this
    pub min_free_memory_mb: u64,
    /// Processing idles when discharging below this battery level
    pub min_battery_percent: u8,
    /// Dimensionality of the default hashing embedder
    pub embedding_dimension: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let downloads = dirs::download_dir().unwrap_or_else(|| home.join("Downloads"));
        let documents = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));
        let desktop = dirs::desktop_dir().unwrap_or_else(|| home.join("Desktop"));

        Self {
            dry_run: false,
            watch_directories: vec![downloads.clone()],
            scan_roots: vec![desktop, documents, downloads],
            category_map: BTreeMap::new(),
            data_dir: home.join(".sentinel"),
            classification_threshold: 0.10,
            escalation_threshold: 0.60,
            folder_match_threshold: 0.55,
            nli_folder_match_threshold: 0.75,
            memory_recall_threshold: 0.70,
            semantic_memory_threshold: 0.75,
            max_memory_entries: 200,
            max_file_size_mb: 200,
            session_window_minutes: 5,
            ignore_patterns: vec![
                ".tmp".to_string(),
                ".crdownload".to_string(),
                ".part".to_string(),
                "._*".to_string(),
            ],
            atlas_max_depth: 4,
            min_free_memory_mb: 100,
            min_battery_percent: 20,
            embedding_dimension: crate::vector::DEFAULT_DIMENSION,
        }
    }
}

impl Settings {
    /// Default location of the settings file
    pub fn default_path() -> PathBuf {
        Settings::default().data_dir.join("config.json")
    }

    /// Load settings from `path` (or the default location) and apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut settings = Self::from_file(&path)?;

        // A missing .env is the normal case
        let _ = dotenvy::dotenv();
        settings.apply_overrides(|key| std::env::var(key).ok())?;

        Ok(settings)
    }

    /// Load settings from a JSON file without environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SENTINEL_*` overrides through the given lookup
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(value) = var("DRY_RUN") {
            self.dry_run = parse_bool(&value).ok_or_else(|| ConfigError::InvalidOverride {
                key: "SENTINEL_DRY_RUN".to_string(),
                value: value.clone(),
            })?;
        }

        if let Some(value) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }

        if let Some(value) = var("WATCH_DIRECTORIES") {
            self.watch_directories = std::env::split_paths(&value).collect();
        }

        if let Some(value) = var("CLASSIFICATION_THRESHOLD") {
            self.classification_threshold =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        key: "SENTINEL_CLASSIFICATION_THRESHOLD".to_string(),
                        value: value.clone(),
                    })?;
        }

        Ok(())
    }

    /// Merge these settings into the JSON file at `path`, keeping keys this
    /// version does not know about.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut current: serde_json::Map<String, serde_json::Value> = std::fs::read(path)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();

        if let Ok(serde_json::Value::Object(ours)) = serde_json::to_value(self) {
            current.extend(ours);
        }

        let data = serde_json::to_vec_pretty(&current).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        atomic_write(path, &data)?;
        Ok(())
    }

    /// Root under which new category folders and `_Needs_Review` are created
    pub fn primary_watch_dir(&self) -> PathBuf {
        self.watch_directories
            .first()
            .cloned()
            .unwrap_or_else(|| self.data_dir.join("inbox"))
    }

    pub fn atlas_index_path(&self) -> PathBuf {
        self.data_dir.join("atlas_v2.json")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.data_dir.join("memory.json")
    }

    pub fn transactions_path(&self) -> PathBuf {
        self.data_dir.join("transactions.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }

    /// Whether a file name matches one of the ignore patterns
    pub fn is_ignored(&self, file_name: &str) -> bool {
        self.ignore_patterns.iter().any(|pattern| {
            match pattern.strip_suffix('*') {
                Some(prefix) => file_name.starts_with(prefix),
                None => file_name.ends_with(pattern.as_str()),
            }
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.escalation_threshold, 0.60);
        assert_eq!(settings.max_memory_entries, 200);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"dryRun": true, "maxFileSizeMb": 50}"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert!(settings.dry_run);
        assert_eq!(settings.max_file_size_mb, 50);
        assert_eq!(settings.folder_match_threshold, 0.55);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SENTINEL_DRY_RUN", "yes"),
            ("SENTINEL_DATA_DIR", "/tmp/sentinel-state"),
            ("SENTINEL_CLASSIFICATION_THRESHOLD", "0.25"),
        ]);

        let mut settings = Settings::default();
        settings
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert!(settings.dry_run);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/sentinel-state"));
        assert_eq!(settings.classification_threshold, 0.25);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut settings = Settings::default();
        let result = settings.apply_overrides(|k| {
            (k == "SENTINEL_DRY_RUN").then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidOverride { .. })));
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let settings = Settings {
            dry_run: true,
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["dryRun"], true);
        assert_eq!(Settings::from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_ignore_patterns() {
        let settings = Settings::default();
        assert!(settings.is_ignored("movie.mp4.crdownload"));
        assert!(settings.is_ignored("._resource"));
        assert!(!settings.is_ignored("report.pdf"));
    }
}
