//! Weighted aggregation of candidate values by selection weights.

use candle_core::{Tensor, D};

use crate::checks;
use crate::core::Result;

/// Contracts `omega: [*B, N, K]` with `values: [*B, F, N]` into `[*B, K, F]`.
///
/// Row `k` of the output is `sum_n omega[.., n, k] * values[.., :, n]`, a
/// convex combination of the candidate values whenever each rank of `omega`
/// is a distribution.
pub fn aggregate(omega: &Tensor, values: &Tensor) -> Result<Tensor> {
    let (w_batch, w_inner) = checks::split_batch("selection weights", omega, 2)?;
    let (v_batch, v_inner) = checks::split_batch("values", values, 2)?;
    checks::expect_same_batch("values", v_batch, "selection weights", w_batch)?;
    checks::expect_dim("values", "candidate count", v_inner[1], w_inner[0])?;

    let weights = omega.transpose(D::Minus2, D::Minus1)?.contiguous()?;
    let features = values.transpose(D::Minus2, D::Minus1)?.contiguous()?;
    Ok(weights.matmul(&features)?)
}
