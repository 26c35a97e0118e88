//! Soft top-k selection.
//!
//! Turns a score vector over `N` candidates into `K` probability
//! distributions, one per rank, each approximating "candidate `n` is the
//! `k`-th nearest neighbour". The recurrence is:
//!
//! ```text
//! alpha     = softmax(s)
//! omega[0]  = softmax(alpha / t)
//! alpha    += log(1 - omega[k - 1])        for k = 1..K
//! omega[k]  = softmax(alpha / t)
//! ```
//!
//! The `log(1 - omega)` update pushes candidates already claimed by earlier
//! ranks towards zero probability at later ranks, approximating sampling
//! without replacement while staying differentiable. Ranks are computed
//! sequentially; each step is fully batched over `*B` and `N`.

use candle_core::{Tensor, D};
use candle_nn::ops::softmax;

use crate::core::{NknnError, Result};

/// Lower clamp applied to `1 - omega` before taking its log.
///
/// A candidate selected with probability that rounds to one would otherwise
/// produce `log(0) = -inf` and poison later ranks with NaNs. With the floor
/// its logit drops by `ln(1e-30) ~ -69` instead, which is still enough to
/// exclude it after the temperature division.
pub const EXCLUSION_FLOOR: f64 = 1e-30;

/// Stateless soft top-k selector with fixed rank count and temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftTopK {
    k: usize,
    temperature: f64,
}

impl SoftTopK {
    pub fn new(k: usize, temperature: f64) -> Result<Self> {
        if k == 0 {
            return Err(NknnError::config("k", "must be at least 1"));
        }
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(NknnError::config(
                "temperature",
                format!("must be a positive finite number, got {temperature}"),
            ));
        }
        Ok(Self { k, temperature })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Maps scores `[*B, N]` to selection weights `[*B, N, K]`.
    pub fn select(&self, scores: &Tensor) -> Result<Tensor> {
        let rank = scores.rank();
        if rank == 0 {
            return Err(NknnError::shape("scores must have a candidate axis"));
        }
        if scores.dim(D::Minus1)? == 0 {
            return Err(NknnError::shape("scores must contain at least one candidate"));
        }

        let inv_t = 1.0 / self.temperature;
        let mut alpha = softmax(scores, D::Minus1)?;
        let mut omegas: Vec<Tensor> = Vec::with_capacity(self.k);
        omegas.push(softmax(&alpha.affine(inv_t, 0.0)?, D::Minus1)?);

        for step in 1..self.k {
            let remaining = omegas[step - 1].affine(-1.0, 1.0)?;
            if log::log_enabled!(log::Level::Debug) {
                log_saturation(step, &remaining)?;
            }
            let exclusion = remaining.maximum(EXCLUSION_FLOOR)?.log()?;
            alpha = alpha.add(&exclusion)?;
            omegas.push(softmax(&alpha.affine(inv_t, 0.0)?, D::Minus1)?);
        }

        Ok(Tensor::stack(&omegas, rank)?)
    }
}

fn log_saturation(step: usize, remaining: &Tensor) -> Result<()> {
    let smallest = remaining
        .flatten_all()?
        .min(0)?
        .to_dtype(candle_core::DType::F64)?
        .to_vec0::<f64>()?;
    if smallest < EXCLUSION_FLOOR {
        log::debug!(
            "nknn exclusion floor engaged at rank {step}: min(1 - omega)={smallest:e} floor={:e}",
            EXCLUSION_FLOOR
        );
    }
    Ok(())
}
