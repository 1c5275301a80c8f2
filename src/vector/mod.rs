//! Vector Module
//!
//! Embedding providers and the similarity primitives shared by the atlas,
//! the semantic memory and the classifier. Providers are injected as
//! `Arc<dyn Embedder>` so tests can run on the deterministic hashing
//! embedder without downloading a model.

pub mod embedder;
pub mod search;

pub use embedder::*;
pub use search::EmbeddingMatrix;

use thiserror::Error;

/// Guards cosine similarity against zero-length vectors
pub const NORM_EPSILON: f32 = 1e-8;

/// Errors raised by embedding providers
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding inference failed: {0}")]
    Inference(String),

    #[error("Embedding provider returned {got} vectors for {expected} inputs")]
    BatchMismatch { expected: usize, got: usize },
}

/// Text → fixed-length vector provider
///
/// Implementations must be deterministic for identical input and keep the
/// same dimensionality for the lifetime of the process.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts, preserving order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output dimensionality
    fn dimension(&self) -> usize;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Euclidean norm of a vector
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity: `dot(a, b) / (|a| * |b| + eps)`
///
/// Norms are always measured; inputs are not assumed to be unit length.
/// Vectors of different length score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm(a) * norm(b) + NORM_EPSILON)
}

/// True when every component is a finite number
pub fn is_finite_vector(v: &[f32]) -> bool {
    !v.is_empty() && v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_does_not_assume_unit_length() {
        let a = vec![3.0, 0.0];
        let b = vec![10.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_zero_and_mismatched() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_is_finite_vector() {
        assert!(is_finite_vector(&[0.1, -0.2]));
        assert!(!is_finite_vector(&[]));
        assert!(!is_finite_vector(&[f32::NAN, 0.0]));
    }
}
