use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// MIME type used when detection has nothing better to offer
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Everything the voters know about one file during one processing pass
///
/// Built by an [`Enricher`](crate::enrich::Enricher), consumed by the voting
/// engine, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContext {
    /// Absolute path
    pub path: PathBuf,
    /// Detected media type
    pub mime_type: String,
    /// Extracted text (possibly empty)
    pub text: String,
    /// Arbitrary extractor metadata; ordered so keyword lists are stable
    pub metadata: BTreeMap<String, String>,
    /// File size in bytes
    pub size: u64,
    /// Created timestamp, when the platform reports one
    pub created_at: Option<DateTime<Utc>>,
}

impl FileContext {
    /// Context with a MIME type guessed from the extension and no text
    pub fn from_path(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();

        Self {
            path: path.to_path_buf(),
            mime_type: guess_mime(path),
            text: String::new(),
            metadata: BTreeMap::new(),
            size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
            created_at: metadata
                .and_then(|m| m.created().ok())
                .map(DateTime::<Utc>::from),
        }
    }

    /// Lowercased extension without the dot, empty if none
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// File name for logs
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// MIME type guess based on extension
pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_path_guesses_mime_and_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Holiday.JPG");
        std::fs::write(&path, [0u8; 12]).unwrap();

        let ctx = FileContext::from_path(&path);
        assert_eq!(ctx.mime_type, "image/jpeg");
        assert_eq!(ctx.extension(), "jpg");
        assert_eq!(ctx.size, 12);
        assert!(!ctx.has_text());
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let ctx = FileContext::from_path(Path::new("/nowhere/blob.zzqx"));
        assert_eq!(ctx.mime_type, FALLBACK_MIME);
        assert_eq!(ctx.size, 0);
    }
}
