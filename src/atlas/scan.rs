//! Bulk atlas scan
//!
//! Discovers folders under the scan roots, embeds their names, and samples a
//! few supported files per folder to seed content centroids. Long running:
//! callers run it on a blocking worker, observe it through a progress
//! callback and stop it with a [`CancellationToken`].

use super::{normalize_folder, Atlas, FolderCluster};
use crate::enrich::Enricher;
use crate::utils::{truncate_chars, CancellationToken};
use crate::wal::StoreError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

/// Files sampled per folder when computing a centroid
pub const MAX_SAMPLE_FILES: usize = 10;

/// Sampled text shorter than this (trimmed) is ignored
const MIN_SAMPLE_TEXT_CHARS: usize = 20;

/// Sampled text is truncated to this many characters before embedding
const MAX_SAMPLE_TEXT_CHARS: usize = 1000;

/// Extensions whose content contributes to folder centroids
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "docx", "doc", "pptx", "ppt", "py", "js", "ts", "java", "cpp", "c", "h",
    "go", "rs", "json", "yaml", "yml", "xml", "html", "css", "csv", "xlsx", "xls",
];

/// Progress update emitted during a scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Outcome of a scan
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub folders_discovered: usize,
    pub folders_with_centroid: usize,
    pub files_sampled: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl Atlas {
    /// Load the persisted index, or scan `roots` when it is missing or
    /// needs a rebuild.
    pub fn initialize(
        &mut self,
        roots: &[PathBuf],
        enricher: &dyn Enricher,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        match self.load()? {
            super::LoadOutcome::Loaded(_) => Ok(()),
            super::LoadOutcome::Missing => {
                self.build_index(roots, enricher, &|_| {}, cancel)?;
                Ok(())
            }
            super::LoadOutcome::NeedsRebuild(reason) => {
                tracing::info!("[Atlas] Rescanning: {}", reason);
                self.build_index(roots, enricher, &|_| {}, cancel)?;
                Ok(())
            }
        }
    }

    /// Scan `roots` and (re)compute clusters for every discovered folder.
    ///
    /// Discovered folders get a fresh name embedding and a centroid computed
    /// from up to [`MAX_SAMPLE_FILES`] samples. Clusters already in the index
    /// but not rediscovered are kept. A cancelled scan persists the folders
    /// completed so far.
    pub fn build_index(
        &mut self,
        roots: &[PathBuf],
        enricher: &dyn Enricher,
        progress: &dyn Fn(ScanProgress),
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, StoreError> {
        let start = Instant::now();
        tracing::info!("[Atlas] Starting cluster-based filesystem scan");

        let folders = discover_folders(roots, self.config.max_depth, &self.config.ignore_folders);
        let total = folders.len();
        let mut summary = ScanSummary {
            folders_discovered: total,
            ..Default::default()
        };
        tracing::info!("[Atlas] Discovered {} folders", total);

        if total == 0 {
            tracing::warn!("[Atlas] No folders found to index");
            summary.elapsed_ms = start.elapsed().as_millis() as u64;
            return Ok(summary);
        }

        progress(ScanProgress {
            current: 0,
            total,
            message: "Computing folder name embeddings".to_string(),
        });
        let names: Vec<String> = folders
            .iter()
            .map(|f| super::humanize(&super::folder_name(f)))
            .collect();
        let name_embeddings: Vec<Option<Vec<f32>>> = match self.embedder.embed_batch(&names) {
            Ok(embeddings) if embeddings.len() == names.len() => {
                embeddings.into_iter().map(Some).collect()
            }
            Ok(embeddings) => {
                tracing::warn!(
                    expected = names.len(),
                    got = embeddings.len(),
                    "[Atlas] Name embedding batch size mismatch"
                );
                vec![None; names.len()]
            }
            Err(e) => {
                tracing::warn!("[Atlas] Failed to embed folder names: {}", e);
                vec![None; names.len()]
            }
        };

        for (idx, (folder, name_embedding)) in folders.into_iter().zip(name_embeddings).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("[Atlas] Scan cancelled after {} folders", idx);
                summary.cancelled = true;
                break;
            }

            let message = format!("Scanning {}", super::folder_name(&folder));
            if (idx + 1) % 10 == 0 || idx + 1 == total {
                tracing::info!("[Atlas] {} ({}/{})", message, idx + 1, total);
            }
            progress(ScanProgress {
                current: idx + 1,
                total,
                message,
            });

            let mut cluster = FolderCluster::new(folder.clone(), name_embedding);
            summary.files_sampled += self.sample_folder(&mut cluster, enricher);
            if cluster.centroid.is_some() {
                summary.folders_with_centroid += 1;
            }
            self.clusters.insert(folder, cluster);
        }

        self.rebuild_index();
        self.save()?;

        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "[Atlas] Scan complete in {}ms. Indexed {} folders",
            summary.elapsed_ms,
            self.clusters.len()
        );
        Ok(summary)
    }

    /// Fold sampled immediate children of the folder into its centroid,
    /// returning how many samples were used
    fn sample_folder(&self, cluster: &mut FolderCluster, enricher: &dyn Enricher) -> usize {
        let entries = match std::fs::read_dir(&cluster.path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(folder = %cluster.path.display(), "[Atlas] Unreadable folder: {}", e);
                return 0;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_supported(p))
            .collect();
        files.sort();

        let mut sampled = 0;
        for file in files.into_iter().take(MAX_SAMPLE_FILES) {
            let ctx = enricher.enrich(&file);
            if ctx.text.trim().chars().count() <= MIN_SAMPLE_TEXT_CHARS {
                continue;
            }

            match self.embedder.embed(truncate_chars(&ctx.text, MAX_SAMPLE_TEXT_CHARS)) {
                Ok(embedding) => {
                    if cluster.update_centroid(&embedding) {
                        sampled += 1;
                    }
                }
                Err(e) => {
                    tracing::debug!(file = %file.display(), "[Atlas] Failed to embed sample: {}", e);
                }
            }
        }

        sampled
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Depth-bounded walk of every root, returning indexable folders (roots
/// themselves excluded).
///
/// Hidden and ignored folders are pruned, as are folders named like another
/// scan root so nested roots are not indexed twice.
pub fn discover_folders(
    roots: &[PathBuf],
    max_depth: usize,
    ignore_folders: &BTreeSet<String>,
) -> Vec<PathBuf> {
    let root_names: BTreeSet<String> = roots
        .iter()
        .filter_map(|r| r.file_name())
        .map(|n| n.to_string_lossy().to_lowercase())
        .collect();

    let keep = |entry: &DirEntry| -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        let lower = name.to_lowercase();
        !(name.starts_with('.') || ignore_folders.contains(&lower) || root_names.contains(&lower))
    };

    let mut discovered = BTreeSet::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }

        for entry in WalkDir::new(root)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(keep)
            .filter_map(|e| e.ok())
        {
            if entry.depth() > 0 && entry.file_type().is_dir() {
                discovered.insert(normalize_folder(entry.path()));
            }
        }
    }

    discovered.into_iter().collect()
}
