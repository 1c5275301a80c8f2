//! Dense nearest-neighbor search
//!
//! `EmbeddingMatrix` packs row vectors into one contiguous buffer together
//! with their precomputed norms. It is rebuilt whenever the underlying set of
//! vectors changes, never per query; a query costs O(rows * dim).

use super::{norm, NORM_EPSILON};

/// Row-major matrix of embeddings with cached row norms
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    norms: Vec<f32>,
    dim: usize,
}

impl EmbeddingMatrix {
    /// Build from rows, skipping any row whose length differs from `dim`.
    ///
    /// Returns the matrix and, for each stored row, the index of the input row
    /// it came from.
    pub fn from_rows<'a, I>(dim: usize, rows: I) -> (Self, Vec<usize>)
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut data = Vec::new();
        let mut norms = Vec::new();
        let mut kept = Vec::new();

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim || dim == 0 {
                continue;
            }
            data.extend_from_slice(row);
            norms.push(norm(row));
            kept.push(i);
        }

        (Self { data, norms, dim }, kept)
    }

    pub fn rows(&self) -> usize {
        self.norms.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows() {
            return None;
        }
        let start = index * self.dim;
        Some(&self.data[start..start + self.dim])
    }

    /// Cosine similarity of `query` against every row
    pub fn similarities(&self, query: &[f32]) -> Vec<f32> {
        if query.len() != self.dim || self.is_empty() {
            return Vec::new();
        }

        let query_norm = norm(query);
        self.data
            .chunks_exact(self.dim)
            .zip(&self.norms)
            .map(|(row, row_norm)| {
                let dot: f32 = row.iter().zip(query).map(|(a, b)| a * b).sum();
                dot / (row_norm * query_norm + NORM_EPSILON)
            })
            .collect()
    }

    /// Index and score of the most similar row.
    ///
    /// Ties resolve to the lowest index, so results are deterministic.
    pub fn best_match(&self, query: &[f32]) -> Option<(usize, f32)> {
        self.similarities(query)
            .into_iter()
            .enumerate()
            .fold(None, |best, (i, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ if score.is_nan() => best,
                _ => Some((i, score)),
            })
    }
}
