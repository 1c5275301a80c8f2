//! Embedding providers
//!
//! - [`HashingEmbedder`]: FNV-hashed term frequencies, L2-normalized. Always
//!   available, no model download, used by default and in tests.
//! - `FastEmbedder` (feature `fastembed`): AllMiniLML6V2 through fastembed-rs.

use super::{EmbedError, Embedder};
use std::collections::HashMap;

/// Default dimensionality, matching AllMiniLML6V2
pub const DEFAULT_DIMENSION: usize = 384;

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// FNV-1a bucket for a term
    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(|s| s.to_lowercase())
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut tf: HashMap<String, f32> = HashMap::new();
        for token in Self::tokenize(text) {
            *tf.entry(token).or_default() += 1.0;
        }

        let mut vec = vec![0.0f32; self.dimension];
        if tf.is_empty() {
            return vec;
        }

        for (term, count) in &tf {
            // Longer terms carry more meaning than short function words
            let weight = count * (1.0 + (term.len() as f32).ln());
            vec[Self::bucket(term, self.dimension)] += weight;
        }

        let norm = super::norm(&vec);
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(feature = "fastembed")]
pub use neural::FastEmbedder;

#[cfg(feature = "fastembed")]
mod neural {
    use super::{EmbedError, Embedder, DEFAULT_DIMENSION};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Local sentence embeddings via fastembed-rs
    ///
    /// Note: This downloads the model on first use (~100MB for AllMiniLML6V2)
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new() -> Result<Self, EmbedError> {
            let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.embed_batch(&[text.to_string()])?
                .pop()
                .ok_or(EmbedError::BatchMismatch {
                    expected: 1,
                    got: 0,
                })
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let mut model = self
                .model
                .lock()
                .map_err(|e| EmbedError::Inference(e.to_string()))?;
            let vectors = model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbedError::Inference(e.to_string()))?;

            if vectors.len() != texts.len() {
                return Err(EmbedError::BatchMismatch {
                    expected: texts.len(),
                    got: vectors.len(),
                });
            }
            Ok(vectors)
        }

        fn dimension(&self) -> usize {
            DEFAULT_DIMENSION
        }

        fn name(&self) -> &str {
            "fastembed-all-minilm-l6-v2"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    #[test]
    fn test_dimension_and_unit_norm() {
        let embedder = HashingEmbedder::new(128);
        let v = embedder.embed("quarterly invoice for consulting services").unwrap();

        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(64);
        let v = embedder.embed("  .. ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::default();
        assert_eq!(
            embedder.embed("lecture notes week three").unwrap(),
            embedder.embed("lecture notes week three").unwrap()
        );
    }

    #[test]
    fn test_overlapping_texts_score_higher() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("invoice payment total amount due").unwrap();
        let b = embedder.embed("invoice total amount").unwrap();
        let c = embedder.embed("holiday beach photos").unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], embedder.embed("alpha beta").unwrap());
        assert_eq!(batch[1], embedder.embed("gamma delta").unwrap());
    }
}
