//! Lightweight validation helpers shared by the pipeline stages.
//!
//! Every helper returns [`NknnError::InvalidShape`] or
//! [`NknnError::UnsupportedDType`] so call sites reject bad inputs before
//! any tensor work happens.

use candle_core::{DType, Tensor};

use crate::core::{NknnError, Result};

/// Dtypes the pipeline accepts as inputs.
pub const SUPPORTED_DTYPES: [DType; 4] = [DType::F16, DType::BF16, DType::F32, DType::F64];

/// Splits `tensor`'s dims into the leading batch dims and `trailing` inner dims.
pub fn split_batch<'a>(
    name: &str,
    tensor: &'a Tensor,
    trailing: usize,
) -> Result<(&'a [usize], &'a [usize])> {
    let dims = tensor.dims();
    if dims.len() < trailing {
        return Err(NknnError::shape(format!(
            "{name} must have at least {trailing} dims, got {dims:?}"
        )));
    }
    Ok(dims.split_at(dims.len() - trailing))
}

/// Ensures two tensors share the same leading batch dims.
pub fn expect_same_batch(
    name: &str,
    batch: &[usize],
    other_name: &str,
    other: &[usize],
) -> Result<()> {
    if batch == other {
        Ok(())
    } else {
        Err(NknnError::shape(format!(
            "{name} batch dims {batch:?} do not match {other_name} batch dims {other:?}"
        )))
    }
}

/// Ensures an axis has the configured extent.
pub fn expect_dim(name: &str, axis: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(NknnError::shape(format!("{name} {axis} must be {expected}, got {actual}")))
    }
}

/// Checks the tensor dtype is one of the supported floating point types.
pub fn expect_float_dtype(name: &str, tensor: &Tensor) -> Result<()> {
    let dtype = tensor.dtype();
    if SUPPORTED_DTYPES.contains(&dtype) {
        Ok(())
    } else {
        Err(NknnError::UnsupportedDType {
            requested: format!("{name} has dtype {dtype:?}, expected one of {SUPPORTED_DTYPES:?}"),
        })
    }
}

/// Checks that `other` lives on the same device and shares the dtype of `reference`.
pub fn expect_compatible(name: &str, reference: &Tensor, other: &Tensor) -> Result<()> {
    if !reference.device().same_device(other.device()) {
        return Err(NknnError::shape(format!("{name} must reside on the same device as the query")));
    }
    if reference.dtype() != other.dtype() {
        return Err(NknnError::UnsupportedDType {
            requested: format!(
                "{name} dtype {:?} does not match query dtype {:?}",
                other.dtype(),
                reference.dtype()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn split_batch_separates_leading_dims() -> candle_core::Result<()> {
        let tensor = Tensor::zeros((2, 3, 4, 5), DType::F32, &Device::Cpu)?;
        let (batch, inner) = split_batch("keys", &tensor, 2).unwrap();
        assert_eq!(batch, &[2, 3]);
        assert_eq!(inner, &[4, 5]);

        let flat = tensor.flatten_all()?;
        let (batch, inner) = split_batch("query", &flat, 1).unwrap();
        assert!(batch.is_empty());
        assert_eq!(inner, &[120]);
        Ok(())
    }

    #[test]
    fn split_batch_rejects_low_rank() -> candle_core::Result<()> {
        let tensor = Tensor::zeros(4, DType::F32, &Device::Cpu)?;
        let err = split_batch("keys", &tensor, 2).unwrap_err();
        assert!(matches!(err, NknnError::InvalidShape { .. }));
        Ok(())
    }

    #[test]
    fn integer_dtypes_are_rejected() -> candle_core::Result<()> {
        let tensor = Tensor::zeros((2, 2), DType::U32, &Device::Cpu)?;
        let err = expect_float_dtype("query", &tensor).unwrap_err();
        assert!(matches!(err, NknnError::UnsupportedDType { .. }));
        Ok(())
    }

    #[test]
    fn mismatched_dtypes_are_rejected() -> candle_core::Result<()> {
        let query = Tensor::zeros(2, DType::F32, &Device::Cpu)?;
        let keys = Tensor::zeros((2, 3), DType::F64, &Device::Cpu)?;
        let err = expect_compatible("keys", &query, &keys).unwrap_err();
        assert!(matches!(err, NknnError::UnsupportedDType { .. }));
        assert!(expect_compatible("keys", &query, &keys.to_dtype(DType::F32)?).is_ok());
        Ok(())
    }
}
