//! Query/key compatibility scores.
//!
//! Scores are scaled dot products: `sign * (q . k_n) / sqrt(D)` where the sign
//! comes from the configured [`Similarity`]. Scaling by `1 / sqrt(D)` keeps the
//! magnitude of the scores independent of the embedding width so the softmax
//! steps downstream see comparable inputs across layer sizes.

use candle_core::Tensor;

use crate::checks;
use crate::core::{NknnError, Result, Similarity};

/// Scores one query against every candidate key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScorer {
    dim: usize,
    similarity: Similarity,
}

impl SimilarityScorer {
    pub fn new(dim: usize, similarity: Similarity) -> Result<Self> {
        if dim == 0 {
            return Err(NknnError::config("dim", "must be at least 1"));
        }
        Ok(Self { dim, similarity })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// Maps `query: [*B, D]` and `keys: [*B, D, N]` to scores `[*B, N]`.
    pub fn score(&self, query: &Tensor, keys: &Tensor) -> Result<Tensor> {
        let (q_batch, q_inner) = checks::split_batch("query", query, 1)?;
        let (k_batch, k_inner) = checks::split_batch("keys", keys, 2)?;
        checks::expect_same_batch("keys", k_batch, "query", q_batch)?;
        checks::expect_dim("query", "embedding dim", q_inner[0], self.dim)?;
        checks::expect_dim("keys", "embedding dim", k_inner[0], self.dim)?;

        // [*B, D] -> [*B, 1, D] so the contraction is a batched matmul.
        let row_axis = q_batch.len();
        let query_row = query.unsqueeze(row_axis)?.contiguous()?;
        let dots = query_row.matmul(&keys.contiguous()?)?.squeeze(row_axis)?;

        let scale = self.similarity.sign() / (self.dim as f64).sqrt();
        Ok(dots.affine(scale, 0.0)?)
    }
}
