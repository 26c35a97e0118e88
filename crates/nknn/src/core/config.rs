//! Configuration for soft k-nearest-neighbour layers.
//!
//! [`NknnConfig`] captures the fixed knobs of a layer: how many neighbours to
//! extract, the embedding and feature widths, and the softmax temperature. It
//! derives `serde` traits so host models can embed it in their own config
//! files; [`NknnConfig::validate`] must pass before a layer is built.

use serde::{Deserialize, Serialize};

use super::errors::{NknnError, Result};

/// Score metric applied between the query and each candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// `-(q . k) / sqrt(D)`. Candidates anti-aligned with the query score highest.
    #[default]
    NegatedDot,
    /// `(q . k) / sqrt(D)`. Candidates aligned with the query score highest.
    Dot,
}

impl Similarity {
    /// Sign applied to the scaled dot product.
    pub fn sign(&self) -> f64 {
        match self {
            Similarity::NegatedDot => -1.0,
            Similarity::Dot => 1.0,
        }
    }
}

/// Where aggregated features come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// Keys double as values; the feature width equals the key width.
    KeysAsValues,
    /// Callers supply a separate `[*B, feature_dim, N]` values tensor.
    Distinct { feature_dim: usize },
}

/// Configuration driving a soft k-NN layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NknnConfig {
    /// Number of soft neighbours (ranks) to produce.
    pub k: usize,
    /// Width `D` of queries and keys.
    pub dim: usize,
    /// Softmax temperature; smaller values approach hard top-k selection.
    pub temperature: f64,
    /// Width `F` of separate value vectors. `None` reuses the keys as values.
    #[serde(default)]
    pub feature_dim: Option<usize>,
    #[serde(default)]
    pub similarity: Similarity,
}

impl NknnConfig {
    /// Keys-as-values configuration with the default metric.
    pub fn new(k: usize, dim: usize, temperature: f64) -> Self {
        Self {
            k,
            dim,
            temperature,
            feature_dim: None,
            similarity: Similarity::default(),
        }
    }

    /// Switches to distinct values of width `feature_dim`.
    pub fn with_feature_dim(mut self, feature_dim: usize) -> Self {
        self.feature_dim = Some(feature_dim);
        self
    }

    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    /// Parses a TOML table such as `k = 4`, `dim = 64`, `temperature = 0.1`.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: NknnConfig = toml::from_str(contents)
            .map_err(|err| NknnError::config("toml", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the structural invariants of the layer.
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(NknnError::config("k", "must be at least 1"));
        }
        if self.dim == 0 {
            return Err(NknnError::config("dim", "must be at least 1"));
        }
        if let Some(0) = self.feature_dim {
            return Err(NknnError::config("feature_dim", "must be at least 1"));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(NknnError::config(
                "temperature",
                format!("must be a positive finite number, got {}", self.temperature),
            ));
        }
        Ok(())
    }

    pub fn value_mode(&self) -> ValueMode {
        match self.feature_dim {
            Some(feature_dim) => ValueMode::Distinct { feature_dim },
            None => ValueMode::KeysAsValues,
        }
    }

    /// Width of the aggregated output rows.
    pub fn output_dim(&self) -> usize {
        self.feature_dim.unwrap_or(self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_sizes() {
        for (config, field) in [
            (NknnConfig::new(0, 4, 1.0), "k"),
            (NknnConfig::new(2, 0, 1.0), "dim"),
            (NknnConfig::new(2, 4, 1.0).with_feature_dim(0), "feature_dim"),
        ] {
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, NknnError::InvalidConfig { field: f, .. } if f == field),
                "expected {field} to be rejected, got {err}"
            );
        }
    }

    #[test]
    fn rejects_non_positive_temperature() {
        for temperature in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let err = NknnConfig::new(1, 4, temperature).validate().unwrap_err();
            assert!(matches!(
                err,
                NknnError::InvalidConfig {
                    field: "temperature",
                    ..
                }
            ));
        }
    }

    #[test]
    fn feature_dim_selects_value_mode() {
        let shared = NknnConfig::new(3, 8, 0.5);
        assert_eq!(shared.value_mode(), ValueMode::KeysAsValues);
        assert_eq!(shared.output_dim(), 8);

        let distinct = shared.with_feature_dim(5);
        assert_eq!(distinct.value_mode(), ValueMode::Distinct { feature_dim: 5 });
        assert_eq!(distinct.output_dim(), 5);
    }

    #[test]
    fn toml_defaults_optional_fields() {
        let config = NknnConfig::from_toml_str("k = 4\ndim = 16\ntemperature = 0.1\n").unwrap();
        assert_eq!(config, NknnConfig::new(4, 16, 0.1));
        assert_eq!(config.similarity, Similarity::NegatedDot);
    }

    #[test]
    fn toml_accepts_metric_and_features() {
        let config = NknnConfig::from_toml_str(
            "k = 2\ndim = 3\ntemperature = 1.0\nfeature_dim = 7\nsimilarity = \"dot\"\n",
        )
        .unwrap();
        assert_eq!(config.feature_dim, Some(7));
        assert_eq!(config.similarity, Similarity::Dot);
    }

    #[test]
    fn toml_is_validated() {
        let err = NknnConfig::from_toml_str("k = 2\ndim = 3\ntemperature = -1.0\n").unwrap_err();
        assert!(matches!(err, NknnError::InvalidConfig { field: "temperature", .. }));

        let err = NknnConfig::from_toml_str("k = 2\n").unwrap_err();
        assert!(matches!(err, NknnError::InvalidConfig { field: "toml", .. }));
    }
}
