//! Differentiable soft k-nearest-neighbour selection for the transformer project.
//!
//! Given a query `[*B, D]`, candidate keys `[*B, D, N]` and optional values
//! `[*B, F, N]`, the layer returns `[*B, K, F]`: K convex combinations of the
//! values, one per neighbour rank, each approximating "the value of the k-th
//! nearest key". Selection is a temperature-controlled softmax recurrence
//! rather than a sort, so gradients flow through the choice of neighbours as
//! well as through the aggregated values.
//!
//! The pipeline is strictly feed-forward and stateless:
//!
//! 1. [`similarity`] scores every candidate against the query.
//! 2. [`selection`] turns the scores into K per-rank distributions, excluding
//!    mass already claimed by earlier ranks.
//! 3. [`aggregate`] contracts those distributions with the values.
//!
//! Half-precision inputs are promoted to `f32` internally; see [`precision`].
//! The crate logs through the `log` facade and never installs a logger.

pub mod aggregate;
pub mod checks;
pub mod core;
pub mod layer;
pub mod precision;
pub mod selection;
pub mod similarity;

pub use crate::core::{NeighborRetrieval, NknnConfig, NknnError, Result, Similarity, ValueMode};
pub use aggregate::aggregate;
pub use layer::NeighborAggregation;
pub use selection::{SoftTopK, EXCLUSION_FLOOR};
pub use similarity::SimilarityScorer;
