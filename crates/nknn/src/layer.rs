//! The soft k-nearest-neighbour layer.
//!
//! [`NeighborAggregation`] wires the scorer, the soft top-k selector and the
//! aggregator together behind the [`NeighborRetrieval`] trait. All shape
//! checks happen up front so a call either fails before any tensor work or
//! runs to completion. Every operation is a differentiable Candle op, so
//! gradients reach the query, keys and values when they are tracked `Var`s.

use std::sync::OnceLock;

use candle_core::Tensor;

use crate::aggregate::aggregate;
use crate::checks;
use crate::core::{NeighborRetrieval, NknnConfig, NknnError, Result, Similarity, ValueMode};
use crate::precision::PrecisionPolicy;
use crate::selection::SoftTopK;
use crate::similarity::SimilarityScorer;

/// Differentiable approximation of "the values of the K nearest keys".
#[derive(Debug)]
pub struct NeighborAggregation {
    config: NknnConfig,
    scorer: SimilarityScorer,
    selector: SoftTopK,
    first_call: OnceLock<()>,
}

impl NeighborAggregation {
    /// Build a layer from a validated configuration.
    pub fn new(config: NknnConfig) -> Result<Self> {
        config.validate()?;
        let scorer = SimilarityScorer::new(config.dim, config.similarity)?;
        let selector = SoftTopK::new(config.k, config.temperature)?;
        Ok(Self {
            config,
            scorer,
            selector,
            first_call: OnceLock::new(),
        })
    }

    /// Shorthand for `k` neighbours over `dim`-wide keys; `feature_dim: None`
    /// aggregates the keys themselves.
    pub fn with_dims(
        k: usize,
        dim: usize,
        temperature: f64,
        feature_dim: Option<usize>,
    ) -> Result<Self> {
        let mut config = NknnConfig::new(k, dim, temperature);
        config.feature_dim = feature_dim;
        Self::new(config)
    }

    pub fn config(&self) -> &NknnConfig {
        &self.config
    }

    pub fn k(&self) -> usize {
        self.config.k
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn feature_dim(&self) -> usize {
        self.config.output_dim()
    }

    pub fn temperature(&self) -> f64 {
        self.config.temperature
    }

    pub fn similarity(&self) -> Similarity {
        self.config.similarity
    }

    pub fn value_mode(&self) -> ValueMode {
        self.config.value_mode()
    }

    /// Aggregate into `[*B, K, F]`.
    pub fn forward(
        &self,
        query: &Tensor,
        keys: &Tensor,
        values: Option<&Tensor>,
    ) -> Result<Tensor> {
        let (output, _) = self.forward_with_weights(query, keys, values)?;
        Ok(output)
    }

    /// Like [`forward`](Self::forward) but also returns the selection
    /// weights `[*B, N, K]`, both in the query dtype.
    pub fn forward_with_weights(
        &self,
        query: &Tensor,
        keys: &Tensor,
        values: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        let values = self.resolve_values(keys, values)?;
        let candidates = self.validate(query, keys, Some(values))?;
        let policy = PrecisionPolicy::from_input_dtype(query.dtype());
        self.log_call(query, candidates, &policy);

        let query = policy.cast_for_compute(query)?;
        let keys_work = policy.cast_for_compute(keys)?;
        let values_work = policy.cast_for_compute(values)?;

        let scores = self.scorer.score(&query, &keys_work)?;
        let omega = self.selector.select(&scores)?;
        let output = aggregate(&omega, &values_work)?;

        Ok((policy.cast_to_storage(&output)?, policy.cast_to_storage(&omega)?))
    }

    /// Selection weights `[*B, N, K]` without aggregating any values.
    pub fn select(&self, query: &Tensor, keys: &Tensor) -> Result<Tensor> {
        let candidates = self.validate(query, keys, None)?;
        let policy = PrecisionPolicy::from_input_dtype(query.dtype());
        self.log_call(query, candidates, &policy);

        let scores = self
            .scorer
            .score(&policy.cast_for_compute(query)?, &policy.cast_for_compute(keys)?)?;
        let omega = self.selector.select(&scores)?;
        Ok(policy.cast_to_storage(&omega)?)
    }

    fn resolve_values<'a>(
        &self,
        keys: &'a Tensor,
        values: Option<&'a Tensor>,
    ) -> Result<&'a Tensor> {
        match (values, self.value_mode()) {
            (Some(values), _) => Ok(values),
            (None, ValueMode::KeysAsValues) => Ok(keys),
            (None, ValueMode::Distinct { .. }) => Err(NknnError::MissingValues),
        }
    }

    /// Checks every input against the configuration and returns `N`.
    fn validate(&self, query: &Tensor, keys: &Tensor, values: Option<&Tensor>) -> Result<usize> {
        checks::expect_float_dtype("query", query)?;
        checks::expect_compatible("keys", query, keys)?;

        let (q_batch, q_inner) = checks::split_batch("query", query, 1)?;
        let (k_batch, k_inner) = checks::split_batch("keys", keys, 2)?;
        checks::expect_same_batch("keys", k_batch, "query", q_batch)?;
        checks::expect_dim("query", "embedding dim", q_inner[0], self.config.dim)?;
        checks::expect_dim("keys", "embedding dim", k_inner[0], self.config.dim)?;

        let candidates = k_inner[1];
        if candidates == 0 {
            return Err(NknnError::shape("keys must contain at least one candidate"));
        }

        if let Some(values) = values {
            checks::expect_compatible("values", query, values)?;
            let (v_batch, v_inner) = checks::split_batch("values", values, 2)?;
            checks::expect_same_batch("values", v_batch, "query", q_batch)?;
            checks::expect_dim("values", "feature dim", v_inner[0], self.feature_dim())?;
            checks::expect_dim("values", "candidate count", v_inner[1], candidates)?;
        }

        Ok(candidates)
    }

    fn log_call(&self, query: &Tensor, candidates: usize, policy: &PrecisionPolicy) {
        if self.first_call.set(()).is_ok() {
            log::info!(
                "nknn init k={} dim={} feature_dim={} temperature={} similarity={:?}",
                self.config.k,
                self.config.dim,
                self.feature_dim(),
                self.config.temperature,
                self.config.similarity,
            );
            log::info!(
                "nknn precision storage={:?} compute={:?} value_mode={:?}",
                policy.storage(),
                policy.compute(),
                self.value_mode(),
            );
        }
        log::debug!(
            "nknn forward query={:?} candidates={} ranks={}",
            query.dims(),
            candidates,
            self.config.k
        );
    }
}

impl NeighborRetrieval for NeighborAggregation {
    fn retrieve(&self, query: &Tensor, keys: &Tensor, values: Option<&Tensor>) -> Result<Tensor> {
        self.forward(query, keys, values)
    }
}
