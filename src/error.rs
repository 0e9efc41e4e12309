//! Error type shared by every evaluation stage.

use thiserror::Error;

/// Errors raised while validating inputs or computing evaluation statistics.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed recommendation/relevance input (bad ranks, unknown ids, duplicates).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Patience (or grid) parameter outside its valid domain.
    #[error("invalid parameter {0}: must lie in the open interval (0, 1)")]
    InvalidParameter(f64),
    /// KL-divergence where the reference assigns zero mass to observed mass.
    #[error("invalid comparison at index {index}: reference is 0 where observed is {observed}")]
    InvalidComparison { index: usize, observed: f64 },
    /// A statistic with no defined value (empty population, all-zero vector).
    #[error("undefined: {0}")]
    Undefined(String),
    /// Simplex or length validation failure.
    #[error(transparent)]
    Simplex(#[from] logp::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
