//! Precision policy for the selection pipeline.
//!
//! Inputs stored in `f16`/`bf16` are promoted to `f32` before scoring: the
//! exclusion recurrence feeds `log(1 - omega)` back into later ranks and is
//! too sensitive for half precision. `f32` and `f64` inputs compute in place.
//! Results are cast back to the storage dtype on the way out.

use candle_core::{DType, Result, Tensor};

/// Describes how tensors are cast around the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
}

impl PrecisionPolicy {
    /// Builds a policy from the dtype of the incoming query.
    pub fn from_input_dtype(storage: DType) -> Self {
        let compute = match storage {
            DType::F16 | DType::BF16 => DType::F32,
            other => other,
        };
        Self { storage, compute }
    }

    /// Returns the dtype of inputs and outputs.
    pub fn storage(&self) -> DType {
        self.storage
    }

    /// Returns the dtype the recurrence runs in.
    pub fn compute(&self) -> DType {
        self.compute
    }

    /// Absolute tolerance expected when comparing outputs in the storage dtype.
    #[cfg(test)]
    pub(crate) fn tolerance(&self) -> f32 {
        match self.storage {
            DType::BF16 => 5e-2,
            DType::F16 => 1e-2,
            DType::F32 => 1e-5,
            DType::F64 => 1e-9,
            _ => 0.0,
        }
    }

    pub fn cast_for_compute(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.compute)
    }

    pub fn cast_to_storage(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.storage)
    }
}

fn cast_tensor(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        tensor.to_dtype(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn half_precision_promotes_to_f32() {
        for dtype in [DType::F16, DType::BF16] {
            let policy = PrecisionPolicy::from_input_dtype(dtype);
            assert_eq!(policy.storage(), dtype);
            assert_eq!(policy.compute(), DType::F32);
            assert_ne!(policy.compute(), policy.storage());
        }
    }

    #[test]
    fn wide_dtypes_compute_in_place() {
        for dtype in [DType::F32, DType::F64] {
            let policy = PrecisionPolicy::from_input_dtype(dtype);
            assert_eq!(policy.compute(), dtype);
            assert_eq!(policy.storage(), dtype);
        }
    }

    #[test]
    fn cast_round_trip_stays_within_tolerance() -> Result<()> {
        let device = Device::Cpu;
        let policy = PrecisionPolicy::from_input_dtype(DType::BF16);
        let base = Tensor::from_vec(vec![0.125f32, -0.75, 3.5], (3,), &device)?;
        let storage = base.to_dtype(policy.storage())?;

        let compute = policy.cast_for_compute(&storage)?;
        assert_eq!(compute.dtype(), DType::F32);

        let restored = policy
            .cast_to_storage(&compute)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        for (orig, rest) in base.to_vec1::<f32>()?.iter().zip(restored.iter()) {
            assert!((orig - rest).abs() <= policy.tolerance());
        }
        Ok(())
    }

    #[test]
    fn tolerance_loosens_with_narrower_storage() {
        let tolerance = |dtype| PrecisionPolicy::from_input_dtype(dtype).tolerance();
        assert!(tolerance(DType::BF16) > tolerance(DType::F16));
        assert!(tolerance(DType::F16) > tolerance(DType::F32));
        assert!(tolerance(DType::F32) > tolerance(DType::F64));
    }
}
