//! Error types emitted by the neighbour selection pipeline.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NknnError>;

/// Failure categories for configuring or evaluating a soft k-NN layer.
#[derive(Debug, Error)]
pub enum NknnError {
    /// A configuration field is outside its valid range.
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    /// The supplied tensor shapes do not align with the documented contract.
    #[error("invalid tensor shape: {context}")]
    InvalidShape { context: String },
    /// The inputs use a dtype the selector cannot compute with.
    #[error("unsupported dtype {requested}")]
    UnsupportedDType { requested: String },
    /// The layer was configured with distinct values but none were supplied.
    #[error("layer expects a separate values tensor but none was supplied")]
    MissingValues,
    /// A backend-specific failure propagated to the caller.
    #[error("backend error: {message}")]
    Backend { message: String },
}

impl NknnError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        NknnError::InvalidShape {
            context: context.into(),
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        NknnError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for NknnError {
    fn from(err: candle_core::Error) -> Self {
        NknnError::Backend {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_field() {
        let err = NknnError::config("temperature", "must be positive, got 0");
        assert_eq!(
            err.to_string(),
            "invalid configuration for `temperature`: must be positive, got 0"
        );
    }

    #[test]
    fn candle_errors_become_backend_errors() {
        let err: NknnError = candle_core::Error::Msg("boom".into()).into();
        assert!(matches!(err, NknnError::Backend { ref message } if message.contains("boom")));
    }
}
