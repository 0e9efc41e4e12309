//! Patience grids.

use crate::{Error, Patience, Result};

/// Resolution used when none is given: step `0.001`, points `0.001 ..= 0.999`.
pub const DEFAULT_GRID_RESOLUTION: usize = 1000;

/// Ordered patience values inside `(0, 1)` with the spacing used to discretize densities.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParameterGrid {
    points: Vec<Patience>,
    step: f64,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            points: (1..DEFAULT_GRID_RESOLUTION)
                .map(|i| Patience::new(i as f64 / DEFAULT_GRID_RESOLUTION as f64))
                .collect::<Result<Vec<_>>>()
                .unwrap_or_default(),
            step: 1.0 / DEFAULT_GRID_RESOLUTION as f64,
        }
    }
}

impl ParameterGrid {
    /// `i / n` for `i = 1 .. n-1`: both endpoints excluded.
    pub fn with_resolution(n: usize) -> Result<Self> {
        if n < 2 {
            return Err(Error::InvalidInput(format!(
                "grid resolution must be at least 2, got {n}"
            )));
        }
        let step = 1.0 / n as f64;
        let points = (1..n)
            .map(|i| Patience::new(i as f64 * step))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points, step })
    }

    /// Explicit points (strictly increasing, each in `(0, 1)`) with their spacing.
    pub fn from_points(points: &[f64], step: f64) -> Result<Self> {
        if !(step.is_finite() && step > 0.0) {
            return Err(Error::InvalidInput(format!("grid step must be positive, got {step}")));
        }
        let points = points
            .iter()
            .map(|&p| Patience::new(p))
            .collect::<Result<Vec<_>>>()?;
        if points.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidInput(
                "grid points must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { points, step })
    }

    /// A one-point grid (unit step), handy for evaluating at a fixed patience.
    pub fn single(p: f64) -> Result<Self> {
        Self::from_points(&[p], 1.0)
    }

    pub fn points(&self) -> &[Patience] {
        &self.points
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
