//! Evaluation run configuration.

use crate::{Patience, Result, DEFAULT_PATIENCE};

/// Truncation depth used by the reference metric registry.
pub const DEFAULT_DEPTH: usize = 1000;

/// Tolerance used when checking that a vector is a probability simplex.
pub const DEFAULT_SIMPLEX_TOL: f64 = 1e-9;

/// Knobs shared by the analyzer, exposure and fairness stages.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EvalConfig {
    /// Patience for RBP, exposure and the ideal target.
    pub patience: f64,
    /// Truncation depth `k`; `None` scores the whole list.
    pub depth: Option<usize>,
    /// Emit a row for every population user, even without recommendations.
    pub include_missing: bool,
    /// Simplex tolerance for fairness comparisons.
    pub simplex_tol: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            patience: DEFAULT_PATIENCE,
            depth: Some(DEFAULT_DEPTH),
            include_missing: true,
            simplex_tol: DEFAULT_SIMPLEX_TOL,
        }
    }
}

impl EvalConfig {
    /// Validated patience.
    pub fn patience(&self) -> Result<Patience> {
        Patience::new(self.patience)
    }
}
