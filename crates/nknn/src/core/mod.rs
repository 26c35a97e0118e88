//! Core traits and types shared by the neighbour selection pipeline.
//!
//! Tensors carry an arbitrary set of leading batch dimensions `*B`:
//! queries are `[*B, D]`, keys `[*B, D, N]`, values `[*B, F, N]` and the
//! aggregated output `[*B, K, F]`.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::{NknnConfig, Similarity, ValueMode};
pub use errors::{NknnError, Result};

/// Unified interface for soft neighbour retrieval.
///
/// * `query` is `[*B, D]` and `keys` is `[*B, D, N]`.
/// * `values`, when present, is `[*B, F, N]`; when absent the keys are
///   aggregated directly.
/// * The returned tensor is `[*B, K, F]` in the dtype of `query`.
pub trait NeighborRetrieval {
    /// Aggregate the values of the K soft-nearest keys.
    fn retrieve(&self, query: &Tensor, keys: &Tensor, values: Option<&Tensor>) -> Result<Tensor>;
}
