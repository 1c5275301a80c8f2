//! Context enrichment
//!
//! Turns a path into a [`FileContext`]. The built-in [`ContentEnricher`]
//! reads the first 64KB of text-like files, pulls text out of PDF, Word and
//! spreadsheet documents, and guesses the MIME type from the extension. Other
//! providers (OCR, remote parsers) plug in behind the [`Enricher`] trait.

pub mod documents;

pub use documents::{extract_document, DocumentKind, ExtractError};

use crate::models::FileContext;
use crate::wal::safe_read_prefix;
use std::path::Path;

/// Bytes read from a text file for classification
pub const TEXT_PREVIEW_BYTES: usize = 64 * 1024;

/// Extensions treated as plain text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "yaml", "yml", "toml", "xml", "html", "css", "js", "ts", "jsx", "tsx",
    "py", "rb", "go", "rs", "java", "c", "cpp", "h", "hpp", "swift", "kt", "sh", "bash", "zsh",
    "csv", "log", "ini", "conf", "cfg", "tex", "sql", "rst",
];

/// Path → context provider
///
/// Must never fail: on internal errors return a context with empty text and
/// a best-effort MIME type.
pub trait Enricher: Send + Sync {
    fn enrich(&self, path: &Path) -> FileContext;
}

/// Extension-driven enricher for text-like files and documents
#[derive(Debug, Clone, Default)]
pub struct ContentEnricher;

impl ContentEnricher {
    pub fn new() -> Self {
        Self
    }

    fn is_text_like(ctx: &FileContext) -> bool {
        ctx.mime_type.starts_with("text/")
            || TEXT_EXTENSIONS.contains(&ctx.extension().as_str())
    }
}

impl Enricher for ContentEnricher {
    fn enrich(&self, path: &Path) -> FileContext {
        let mut ctx = FileContext::from_path(path);

        if let Some(kind) = DocumentKind::from_extension(&ctx.extension()) {
            match extract_document(path, kind) {
                Ok(text) => ctx.text = text,
                Err(e) => tracing::debug!(path = %path.display(), "No text extracted: {}", e),
            }
            return ctx;
        }

        if !Self::is_text_like(&ctx) {
            return ctx;
        }

        match safe_read_prefix(path, TEXT_PREVIEW_BYTES) {
            Ok(bytes) => {
                ctx.text = String::from_utf8_lossy(&bytes).into_owned();
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), "No text extracted: {}", e);
            }
        }

        ctx
    }
}
