//! Semantic Memory
//!
//! Long-term few-shot memory: `(text, category, embedding)` examples learned
//! from successful placements and recalled by cosine nearest neighbor instead
//! of retraining anything.
//!
//! The store is capacity-bounded (oldest evicted first) and tolerant of
//! corruption: entries with the wrong dimensionality or non-numeric vectors
//! are dropped at load and rebuild time, shrinking memory instead of failing.

use crate::models::is_unknown;
use crate::utils::truncate_chars;
use crate::vector::{is_finite_vector, Embedder, EmbeddingMatrix};
use crate::wal::{load_json, save_json, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Texts are truncated to this many characters before storing
pub const MAX_TEXT_CHARS: usize = 160;

/// One learned example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub category: String,
    pub embedding: Vec<f32>,
}

/// Bounded few-shot store with a dense recall matrix
pub struct SemanticMemory {
    path: Option<PathBuf>,
    max_entries: usize,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
    entries: Vec<MemoryEntry>,
    matrix: EmbeddingMatrix,
}

impl SemanticMemory {
    /// In-memory store that never persists
    pub fn in_memory(embedder: Arc<dyn Embedder>, max_entries: usize) -> Self {
        let dimension = embedder.dimension();
        Self {
            path: None,
            max_entries: max_entries.max(1),
            dimension,
            embedder,
            entries: Vec::new(),
            matrix: EmbeddingMatrix::default(),
        }
    }

    /// Open the store at `path`, dropping entries that no longer fit the
    /// current embedder. A missing file yields an empty memory.
    pub fn open(
        path: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        max_entries: usize,
    ) -> Result<Self, StoreError> {
        let mut memory = Self::in_memory(embedder, max_entries);
        let path = path.into();

        let raw: Vec<serde_json::Value> = match load_json(&path) {
            Ok(raw) => raw.unwrap_or_default(),
            Err(StoreError::Parse { .. }) => {
                tracing::error!(path = %path.display(), "Memory file unreadable, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let total = raw.len();

        memory.entries = raw
            .into_iter()
            .filter_map(|value| serde_json::from_value::<MemoryEntry>(value).ok())
            .map(|mut entry| {
                entry.text = truncate_chars(&entry.text, MAX_TEXT_CHARS).to_string();
                entry
            })
            .collect();
        memory.path = Some(path);

        let parsed = memory.entries.len();
        memory.rebuild_index();
        let pruned = total - memory.entries.len();

        if pruned > 0 || parsed > memory.max_entries {
            tracing::info!(pruned, "Pruned invalid memory entries on load");
            if let Err(e) = memory.save() {
                tracing::warn!("Failed to rewrite pruned memory: {}", e);
            }
        }
        tracing::info!(examples = memory.entries.len(), "Memory loaded");

        Ok(memory)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn is_valid(&self, embedding: &[f32]) -> bool {
        embedding.len() == self.dimension && is_finite_vector(embedding)
    }

    /// Drop malformed entries, enforce the cap and rebuild the recall matrix
    fn rebuild_index(&mut self) {
        let before = self.entries.len();
        let dimension = self.dimension;
        self.entries
            .retain(|e| e.embedding.len() == dimension && is_finite_vector(&e.embedding));

        let pruned = before - self.entries.len();
        if pruned > 0 {
            tracing::warn!(pruned, "Pruned corrupted memory entries during index rebuild");
        }

        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }

        let (matrix, _) = EmbeddingMatrix::from_rows(
            self.dimension,
            self.entries.iter().map(|e| e.embedding.as_slice()),
        );
        self.matrix = matrix;
    }

    /// Add an example, evicting the oldest when full, then rebuild and persist.
    ///
    /// Returns `Ok(false)` when nothing was learned: unknown category, invalid
    /// embedding, or an identical `(text, category)` example already present.
    pub fn learn(
        &mut self,
        text: &str,
        category: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<bool, StoreError> {
        if is_unknown(category) || text.trim().is_empty() {
            return Ok(false);
        }

        let text = truncate_chars(text, MAX_TEXT_CHARS).to_string();
        if self
            .entries
            .iter()
            .any(|e| e.text == text && e.category == category)
        {
            return Ok(false);
        }

        let embedding = match embedding {
            Some(embedding) => embedding,
            None => match self.embedder.embed(&text) {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!("Memory could not embed example: {}", e);
                    return Ok(false);
                }
            },
        };

        if !self.is_valid(&embedding) {
            tracing::warn!(
                expected = self.dimension,
                got = embedding.len(),
                "Rejected memory example with invalid embedding"
            );
            return Ok(false);
        }

        if self.entries.len() >= self.max_entries {
            self.entries.remove(0);
        }

        self.entries.push(MemoryEntry {
            text: text.clone(),
            category: category.to_string(),
            embedding,
        });
        self.rebuild_index();
        self.save()?;

        tracing::debug!(text = %text, category, "Memory learned");
        Ok(true)
    }

    /// Nearest stored example; its category is returned only when the
    /// similarity exceeds `threshold`.
    pub fn recall(&self, embedding: &[f32], threshold: f32) -> (Option<String>, f32) {
        let Some((index, score)) = self.matrix.best_match(embedding) else {
            return (None, 0.0);
        };

        if score > threshold {
            let category = self.entries.get(index).map(|e| e.category.clone());
            tracing::debug!(category = ?category, score = format!("{:.2}", score), "Memory recall");
            return (category, score);
        }

        (None, score)
    }

    /// Persist the store; a no-op for in-memory stores
    pub fn save(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => save_json(path, &self.entries),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::HashingEmbedder;
    use tempfile::tempdir;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(64))
    }

    #[test]
    fn test_learn_then_recall() {
        let mut memory = SemanticMemory::in_memory(embedder(), 10);
        memory.learn("invoice total amount due", "Finance", None).unwrap();
        memory.learn("holiday beach sunset photo", "Personal", None).unwrap();

        let query = HashingEmbedder::new(64).embed("invoice total amount due").unwrap();
        let (category, score) = memory.recall(&query, 0.7);

        assert_eq!(category.as_deref(), Some("Finance"));
        assert!(score > 0.99);
    }

    #[test]
    fn test_recall_below_threshold_returns_none() {
        let mut memory = SemanticMemory::in_memory(embedder(), 10);
        memory.learn("invoice total amount due", "Finance", None).unwrap();

        let query = HashingEmbedder::new(64).embed("guitar chords").unwrap();
        let (category, _) = memory.recall(&query, 0.9);
        assert!(category.is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut memory = SemanticMemory::in_memory(embedder(), 3);
        for i in 0..5 {
            memory
                .learn(&format!("example number {}", i), "Code", None)
                .unwrap();
            assert!(memory.len() <= 3);
        }

        let texts: Vec<&str> = memory.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["example number 2", "example number 3", "example number 4"]);
    }

    #[test]
    fn test_duplicate_and_unknown_are_not_learned() {
        let mut memory = SemanticMemory::in_memory(embedder(), 10);
        assert!(memory.learn("syllabus week one", "College", None).unwrap());
        assert!(!memory.learn("syllabus week one", "College", None).unwrap());
        assert!(!memory.learn("mystery bytes", "Unknown", None).unwrap());
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let mut memory = SemanticMemory::in_memory(embedder(), 10);
        assert!(!memory
            .learn("short vector", "Code", Some(vec![1.0, 0.0]))
            .unwrap());
        assert!(memory.is_empty());
    }

    #[test]
    fn test_text_is_truncated() {
        let mut memory = SemanticMemory::in_memory(embedder(), 10);
        let long = "word ".repeat(100);
        memory.learn(&long, "Documents", None).unwrap();
        assert_eq!(memory.entries()[0].text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_load_drops_malformed_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let good = HashingEmbedder::new(64).embed("tax return 2023").unwrap();
        let raw = serde_json::json!([
            {"text": "tax return 2023", "category": "Finance", "embedding": good},
            {"text": "stale model", "category": "Code", "embedding": [0.1, 0.2, 0.3]},
            {"text": "garbage", "category": "Code", "embedding": ["a", "b"]},
            {"category": "Code"},
        ]);
        std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let memory = SemanticMemory::open(&path, embedder(), 10).unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.entries()[0].category, "Finance");

        // The pruned store was written back
        let reopened = SemanticMemory::open(&path, embedder(), 10).unwrap();
        assert_eq!(reopened.entries(), memory.entries());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "[{oops").unwrap();

        let memory = SemanticMemory::open(&path, embedder(), 10).unwrap();
        assert!(memory.is_empty());
    }

    #[test]
    fn test_learned_examples_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let mut memory = SemanticMemory::open(&path, embedder(), 10).unwrap();
        memory.learn("conference ticket rsvp", "Events", None).unwrap();

        let reopened = SemanticMemory::open(&path, embedder(), 10).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.entries()[0].category, "Events");
    }
}
