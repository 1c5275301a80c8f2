//! Atlas: cluster-based folder index
//!
//! Each known folder is a cluster with:
//! - a name embedding (always present once computed)
//! - a content centroid, the running mean of the embeddings of files placed
//!   in or sampled from the folder
//!
//! Incoming files are routed to the folder whose effective embedding is most
//! similar. The effective embeddings live in a dense matrix that is rebuilt
//! whenever a cluster changes, so queries never rebuild anything.

pub mod scan;

pub use scan::{ScanProgress, ScanSummary};

use crate::vector::{is_finite_vector, Embedder, EmbeddingMatrix};
use crate::wal::{load_json, save_json, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Samples required before a centroid is trusted over the folder name
pub const MIN_FILES_FOR_CENTROID: usize = 3;

/// Current on-disk index version; older files trigger a full rebuild
pub const INDEX_VERSION: u32 = 2;

/// A folder represented as a cluster of content embeddings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderCluster {
    pub path: PathBuf,
    /// Running mean of content embeddings
    pub centroid: Option<Vec<f32>>,
    /// Embedding of the humanized folder name
    pub name_embedding: Option<Vec<f32>>,
    /// Number of samples folded into the centroid
    pub n_files: usize,
}

impl FolderCluster {
    pub fn new(path: PathBuf, name_embedding: Option<Vec<f32>>) -> Self {
        Self {
            path,
            centroid: None,
            name_embedding,
            n_files: 0,
        }
    }

    /// Fold one embedding into the centroid.
    ///
    /// `centroid += (new - centroid) / (n + 1)`, then `n += 1`. Embeddings
    /// whose length differs from the existing centroid are rejected.
    pub fn update_centroid(&mut self, embedding: &[f32]) -> bool {
        if !is_finite_vector(embedding) {
            return false;
        }

        match &mut self.centroid {
            Some(centroid) if centroid.len() == embedding.len() => {
                let n = (self.n_files + 1) as f32;
                for (c, e) in centroid.iter_mut().zip(embedding) {
                    *c += (e - *c) / n;
                }
                self.n_files += 1;
            }
            Some(_) => return false,
            None => {
                self.centroid = Some(embedding.to_vec());
                self.n_files = 1;
            }
        }
        true
    }

    /// Centroid once `n_files >= MIN_FILES_FOR_CENTROID`, else the name embedding
    pub fn effective_embedding(&self) -> Option<&[f32]> {
        match &self.centroid {
            Some(centroid) if self.n_files >= MIN_FILES_FOR_CENTROID => Some(centroid),
            _ => self.name_embedding.as_deref(),
        }
    }

    /// Last path component, for logs
    pub fn name(&self) -> String {
        folder_name(&self.path)
    }
}

/// Folder discovery settings
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    /// Maximum depth below each scan root
    pub max_depth: usize,
    /// Lowercased folder names never indexed or descended into
    pub ignore_folders: BTreeSet<String>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        let ignore_folders = [
            ".git", "node_modules", "venv", "__pycache__", ".sentinel", "build", "dist", "tmp",
            "temp", "logs", "cache", ".cache", ".local", ".config", "env", ".env",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            max_depth: 4,
            ignore_folders,
        }
    }
}

/// Result of loading a persisted index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Index loaded with this many clusters
    Loaded(usize),
    /// No index on disk yet
    Missing,
    /// The index must be rebuilt by a full scan
    NeedsRebuild(String),
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    clusters: Vec<&'a FolderCluster>,
}

#[derive(Deserialize)]
struct IndexFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    clusters: Vec<serde_json::Value>,
}

/// The folder cluster index
pub struct Atlas {
    index_path: Option<PathBuf>,
    embedder: Arc<dyn Embedder>,
    config: AtlasConfig,
    clusters: BTreeMap<PathBuf, FolderCluster>,
    matrix: EmbeddingMatrix,
    path_index: Vec<PathBuf>,
}

impl Atlas {
    /// Empty, non-persistent atlas
    pub fn in_memory(embedder: Arc<dyn Embedder>, config: AtlasConfig) -> Self {
        Self {
            index_path: None,
            embedder,
            config,
            clusters: BTreeMap::new(),
            matrix: EmbeddingMatrix::default(),
            path_index: Vec::new(),
        }
    }

    /// Empty atlas persisted at `index_path`; call [`Atlas::load`] or
    /// [`Atlas::initialize`] to populate it.
    pub fn new(index_path: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, config: AtlasConfig) -> Self {
        let mut atlas = Self::in_memory(embedder, config);
        atlas.index_path = Some(index_path.into());
        atlas
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn cluster(&self, folder: &Path) -> Option<&FolderCluster> {
        self.clusters.get(&normalize_folder(folder))
    }

    pub fn clusters(&self) -> impl Iterator<Item = &FolderCluster> {
        self.clusters.values()
    }

    /// Number of folders currently searchable
    pub fn indexed_folders(&self) -> usize {
        self.path_index.len()
    }

    /// Load the persisted index.
    ///
    /// Unsupported versions and unreadable files report `NeedsRebuild`;
    /// individually malformed clusters are skipped.
    pub fn load(&mut self) -> Result<LoadOutcome, StoreError> {
        let Some(path) = self.index_path.clone() else {
            return Ok(LoadOutcome::Missing);
        };

        let file: IndexFile = match load_json(&path) {
            Ok(Some(file)) => file,
            Ok(None) => return Ok(LoadOutcome::Missing),
            Err(StoreError::Parse { source, .. }) => {
                tracing::error!(path = %path.display(), "Atlas index unreadable: {}", source);
                return Ok(LoadOutcome::NeedsRebuild(source.to_string()));
            }
            Err(e) => return Err(e),
        };

        if file.version < INDEX_VERSION {
            tracing::info!(version = file.version, "[Atlas] Old index version detected");
            return Ok(LoadOutcome::NeedsRebuild(format!(
                "index version {} < {}",
                file.version, INDEX_VERSION
            )));
        }

        let total = file.clusters.len();
        self.clusters = file
            .clusters
            .into_iter()
            .filter_map(|value| serde_json::from_value::<FolderCluster>(value).ok())
            .map(|cluster| (cluster.path.clone(), cluster))
            .collect();

        if self.clusters.len() < total {
            tracing::warn!(
                dropped = total - self.clusters.len(),
                "[Atlas] Skipped malformed clusters"
            );
        }

        self.rebuild_index();
        tracing::info!(clusters = self.clusters.len(), "[Atlas] Loaded clusters from cache");
        Ok(LoadOutcome::Loaded(self.clusters.len()))
    }

    /// Persist the index; a no-op for in-memory atlases
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };

        save_json(
            path,
            &IndexFileRef {
                version: INDEX_VERSION,
                clusters: self.clusters.values().collect(),
            },
        )
    }

    /// Rebuild the dense search matrix from every cluster's effective
    /// embedding. Clusters whose embedding does not match the embedder's
    /// dimensionality are left out.
    pub fn rebuild_index(&mut self) {
        let dim = self.embedder.dimension();
        let candidates: Vec<(&PathBuf, &[f32])> = self
            .clusters
            .iter()
            .filter_map(|(path, cluster)| cluster.effective_embedding().map(|e| (path, e)))
            .filter(|(_, e)| is_finite_vector(e))
            .collect();

        let (matrix, kept) =
            EmbeddingMatrix::from_rows(dim, candidates.iter().map(|(_, e)| *e));
        self.path_index = kept.into_iter().map(|i| candidates[i].0.clone()).collect();
        self.matrix = matrix;
    }

    /// Most similar folder for a file.
    ///
    /// Uses `embedding` when given, otherwise embeds `fallback_text`. Returns
    /// `(Some(folder), score)` only when `score >= threshold`; otherwise
    /// `(None, best_score_seen)`.
    pub fn find_best_folder(
        &self,
        embedding: Option<&[f32]>,
        fallback_text: Option<&str>,
        threshold: f32,
    ) -> (Option<PathBuf>, f32) {
        if self.matrix.is_empty() {
            return (None, 0.0);
        }

        let owned;
        let query: &[f32] = match (embedding, fallback_text) {
            (Some(embedding), _) => embedding,
            (None, Some(text)) if !text.trim().is_empty() => match self.embedder.embed(text) {
                Ok(vector) => {
                    owned = vector;
                    &owned
                }
                Err(e) => {
                    tracing::warn!("[Atlas] Could not embed query '{}': {}", text, e);
                    return (None, 0.0);
                }
            },
            _ => return (None, 0.0),
        };

        let Some((index, score)) = self.matrix.best_match(query) else {
            return (None, 0.0);
        };

        if score >= threshold {
            let folder = self.path_index[index].clone();
            tracing::info!(
                "[Atlas] Match '{}' -> '{}' (score: {:.3})",
                fallback_text.unwrap_or("embedding"),
                folder_name(&folder),
                score
            );
            return (Some(folder), score);
        }

        (None, score)
    }

    /// Fold a placed file's embedding into its folder's cluster, creating the
    /// cluster on first sight, then rebuild and persist.
    pub fn update_cluster(&mut self, folder: &Path, embedding: &[f32]) -> Result<(), StoreError> {
        let key = normalize_folder(folder);

        if !self.clusters.contains_key(&key) {
            let name_embedding = self.embed_folder_name(&key);
            self.clusters
                .insert(key.clone(), FolderCluster::new(key.clone(), name_embedding));
        }

        let updated = self
            .clusters
            .get_mut(&key)
            .map(|cluster| cluster.update_centroid(embedding))
            .unwrap_or(false);

        if !updated {
            tracing::warn!(folder = %key.display(), "[Atlas] Rejected incompatible embedding");
        }

        self.rebuild_index();
        self.save()?;

        if let Some(cluster) = self.clusters.get(&key) {
            tracing::debug!("[Atlas] Updated cluster '{}' (n={})", cluster.name(), cluster.n_files);
        }
        Ok(())
    }

    fn embed_folder_name(&self, folder: &Path) -> Option<Vec<f32>> {
        let name = humanize(&folder_name(folder));
        match self.embedder.embed(&name) {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                tracing::warn!("[Atlas] Failed to embed folder name '{}': {}", name, e);
                None
            }
        }
    }
}

/// Canonical form of a folder path used as the cluster key
pub fn normalize_folder(folder: &Path) -> PathBuf {
    folder.canonicalize().unwrap_or_else(|_| folder.to_path_buf())
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// "tax_returns-2023" → "tax returns 2023"
pub fn humanize(name: &str) -> String {
    name.replace(['_', '-'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::HashingEmbedder;
    use tempfile::tempdir;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(16))
    }

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_effective_embedding_switches_at_threshold() {
        let name = unit(4, 0);
        let mut cluster = FolderCluster::new(PathBuf::from("/x/Invoices"), Some(name.clone()));

        for k in 0..MIN_FILES_FOR_CENTROID {
            assert_eq!(cluster.effective_embedding(), Some(name.as_slice()), "after {} updates", k);
            cluster.update_centroid(&unit(4, 1));
        }

        assert_eq!(cluster.n_files, MIN_FILES_FOR_CENTROID);
        assert_eq!(cluster.effective_embedding(), Some(unit(4, 1).as_slice()));
    }

    #[test]
    fn test_running_mean_equals_arithmetic_mean_in_any_order() {
        let samples = vec![
            vec![1.0, 0.0, 2.0],
            vec![0.0, 3.0, 1.0],
            vec![2.0, 0.0, 0.0],
            vec![1.0, 1.0, 1.0],
        ];
        let mean = vec![1.0, 1.0, 1.0];

        let mut forward = FolderCluster::new("/f".into(), None);
        samples.iter().for_each(|s| assert!(forward.update_centroid(s)));
        let mut backward = FolderCluster::new("/b".into(), None);
        samples.iter().rev().for_each(|s| assert!(backward.update_centroid(s)));

        for (got, want) in forward.centroid.unwrap().iter().zip(&mean) {
            assert!((got - want).abs() < 1e-5);
        }
        for (got, want) in backward.centroid.unwrap().iter().zip(&mean) {
            assert!((got - want).abs() < 1e-5);
        }
        assert_eq!(forward.n_files, 4);
    }

    #[test]
    fn test_update_rejects_mismatched_dimension() {
        let mut cluster = FolderCluster::new("/f".into(), None);
        assert!(cluster.update_centroid(&[1.0, 0.0]));
        assert!(!cluster.update_centroid(&[1.0, 0.0, 0.0]));
        assert_eq!(cluster.n_files, 1);
    }

    #[test]
    fn test_find_best_folder_respects_threshold() {
        let mut atlas = Atlas::in_memory(embedder(), AtlasConfig::default());
        atlas.clusters.insert(
            "/docs/Invoices".into(),
            FolderCluster::new("/docs/Invoices".into(), Some(unit(16, 0))),
        );
        atlas.clusters.insert(
            "/docs/Photos".into(),
            FolderCluster::new("/docs/Photos".into(), Some(unit(16, 1))),
        );
        atlas.rebuild_index();

        let query = vec![0.8, 0.6, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let (folder, score) = atlas.find_best_folder(Some(&query), None, 0.5);
        assert_eq!(folder, Some(PathBuf::from("/docs/Invoices")));
        assert!((score - 0.8).abs() < 1e-4);

        let (folder, score) = atlas.find_best_folder(Some(&query), None, 0.9);
        assert!(folder.is_none());
        assert!((score - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_find_best_folder_embeds_fallback_text() {
        let embedder = embedder();
        let mut atlas = Atlas::in_memory(embedder.clone(), AtlasConfig::default());
        let name = embedder.embed("tax returns").unwrap();
        atlas.clusters.insert(
            "/docs/tax_returns".into(),
            FolderCluster::new("/docs/tax_returns".into(), Some(name)),
        );
        atlas.rebuild_index();

        let (folder, score) = atlas.find_best_folder(None, Some("tax returns"), 0.9);
        assert_eq!(folder, Some(PathBuf::from("/docs/tax_returns")));
        assert!(score > 0.99);

        assert_eq!(atlas.find_best_folder(None, None, 0.1), (None, 0.0));
    }

    #[test]
    fn test_empty_atlas_finds_nothing() {
        let atlas = Atlas::in_memory(embedder(), AtlasConfig::default());
        assert_eq!(atlas.find_best_folder(Some(&unit(16, 0)), None, 0.0), (None, 0.0));
    }

    #[test]
    fn test_update_cluster_creates_then_averages() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("Lecture_Notes");
        std::fs::create_dir(&folder).unwrap();

        let mut atlas = Atlas::new(dir.path().join("atlas.json"), embedder(), AtlasConfig::default());
        for _ in 0..MIN_FILES_FOR_CENTROID {
            atlas.update_cluster(&folder, &unit(16, 3)).unwrap();
        }

        let cluster = atlas.cluster(&folder).unwrap();
        assert_eq!(cluster.n_files, MIN_FILES_FOR_CENTROID);
        assert!(cluster.name_embedding.is_some());
        assert_eq!(atlas.indexed_folders(), 1);

        let (found, _) = atlas.find_best_folder(Some(&unit(16, 3)), None, 0.99);
        assert_eq!(found, Some(normalize_folder(&folder)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("atlas.json");
        let folder = dir.path().join("Receipts");
        std::fs::create_dir(&folder).unwrap();

        let mut atlas = Atlas::new(&index, embedder(), AtlasConfig::default());
        atlas.update_cluster(&folder, &unit(16, 2)).unwrap();

        let mut reloaded = Atlas::new(&index, embedder(), AtlasConfig::default());
        assert_eq!(reloaded.load().unwrap(), LoadOutcome::Loaded(1));
        assert_eq!(reloaded.cluster(&folder), atlas.cluster(&folder));
        assert_eq!(reloaded.indexed_folders(), 1);
    }

    #[test]
    fn test_old_version_requires_rebuild() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("atlas.json");
        std::fs::write(&index, r#"{"version": 1, "clusters": []}"#).unwrap();

        let mut atlas = Atlas::new(&index, embedder(), AtlasConfig::default());
        assert!(matches!(atlas.load().unwrap(), LoadOutcome::NeedsRebuild(_)));
    }

    #[test]
    fn test_load_skips_malformed_clusters() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("atlas.json");
        let good = FolderCluster::new("/docs/Code".into(), Some(unit(16, 5)));
        let raw = serde_json::json!({
            "version": 2,
            "clusters": [good, {"path": 12}, {"path": "/docs/Stale", "nameEmbedding": [1.0, 0.0], "nFiles": 0}]
        });
        std::fs::write(&index, serde_json::to_vec(&raw).unwrap()).unwrap();

        let mut atlas = Atlas::new(&index, embedder(), AtlasConfig::default());
        assert_eq!(atlas.load().unwrap(), LoadOutcome::Loaded(2));
        // The stale-dimension cluster is kept but not searchable
        assert_eq!(atlas.indexed_folders(), 1);
    }
}
