//! Geometric (rank-biased precision) discounting.
//!
//! A user with patience `p` moves from rank `r` to rank `r + 1` with probability `p`,
//! so the attention paid to rank `r` is `p^(r-1)`. Both endpoints of the patience
//! domain are degenerate (`p = 0` only ever looks at the top item, `p = 1` never
//! decays), so `p` must lie strictly inside `(0, 1)`.
//!
//! For deep ranks and small `p` the linear-space weight underflows to zero. Anything
//! that sums many discounts at once should work with [`log_discount`] and reduce with
//! `logp::log_sum_exp_iter` instead.

use crate::{Error, Result};

/// Patience used by the reference evaluation runs.
pub const DEFAULT_PATIENCE: f64 = 0.8;

/// A validated patience parameter in the open interval `(0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct Patience(f64);

impl Patience {
    /// Validate `p` and wrap it.
    pub fn new(p: f64) -> Result<Self> {
        if p.is_finite() && p > 0.0 && p < 1.0 {
            Ok(Self(p))
        } else {
            Err(Error::InvalidParameter(p))
        }
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }

    /// `ln(p)`; always finite and negative.
    #[inline]
    pub fn ln(self) -> f64 {
        self.0.ln()
    }

    /// `ln(1 - p)`, the geometric-series normalization in log space.
    #[inline]
    pub fn ln_complement(self) -> f64 {
        (-self.0).ln_1p()
    }
}

impl Default for Patience {
    fn default() -> Self {
        Self(DEFAULT_PATIENCE)
    }
}

impl TryFrom<f64> for Patience {
    type Error = Error;

    fn try_from(p: f64) -> Result<Self> {
        Self::new(p)
    }
}

impl From<Patience> for f64 {
    fn from(p: Patience) -> f64 {
        p.0
    }
}

fn check_rank(rank: usize) -> Result<()> {
    if rank == 0 {
        return Err(Error::InvalidInput("ranks are 1-based; got rank 0".to_string()));
    }
    Ok(())
}

/// Attention weight `p^(rank-1)` for a 1-based rank.
pub fn discount(rank: usize, patience: Patience) -> Result<f64> {
    Ok(log_discount(rank, patience)?.exp())
}

/// `(rank - 1) * ln(p)`, the log of [`discount`].
pub fn log_discount(rank: usize, patience: Patience) -> Result<f64> {
    check_rank(rank)?;
    Ok((rank - 1) as f64 * patience.ln())
}

/// [`discount`] for ranks already validated by [`crate::RecList`].
#[inline]
pub(crate) fn rank_weight(rank: usize, patience: Patience) -> f64 {
    (rank.saturating_sub(1) as f64 * patience.ln()).exp()
}

/// Average attention per item when `n` equally relevant items fill the top `n` ranks.
///
/// `(1 - p^n) / (n (1 - p))`, i.e. the mean of `p^0, ..., p^(n-1)`. Returns 0 for `n = 0`.
pub fn test_weight(n: usize, patience: Patience) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = patience.get();
    // p < 1, so p^n has long since reached 0 by i32::MAX.
    let exp = n.min(i32::MAX as usize) as i32;
    (1.0 - p.powi(exp)) / (n as f64 * (1.0 - p))
}

/// Best attainable RBP for a user with `n_good` relevant items.
///
/// All relevant items at the top: `(1 - p) * sum_{i=1..n} p^(i-1) = 1 - p^n`.
pub fn rbp_max(n_good: usize, patience: Patience) -> f64 {
    let p = patience.get();
    1.0 - p.powi(n_good.min(i32::MAX as usize) as i32)
}
