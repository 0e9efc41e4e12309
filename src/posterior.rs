//! Posterior belief about a metric under an uncertain patience.
//!
//! Each grid point `p_j` is reweighted by the prior: `w_j = density(p_j) * step`.
//! Sorting a group's curve by metric value and accumulating the weights gives a
//! weighted empirical CDF of the metric. Grid points are reweighted, never
//! resampled, so the total weight is the prior mass the grid captures; mass lost
//! at the truncated edges is reported, not corrected.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::{Error, MetricCurves, ParameterGrid, Result};

/// Prior mass deviation from 1 above which a warning is logged.
const MASS_WARN_TOL: f64 = 0.05;

/// Relative slack when comparing running sums against a quantile target.
const CUMULATIVE_EPS: f64 = 1e-12;

/// A probability density over patience.
pub trait PriorDensity {
    fn density(&self, p: f64) -> f64;
}

impl<F> PriorDensity for F
where
    F: Fn(f64) -> f64,
{
    fn density(&self, p: f64) -> f64 {
        self(p)
    }
}

/// Uniform density on `(0, 1)`.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformPrior;

impl PriorDensity for UniformPrior {
    fn density(&self, p: f64) -> f64 {
        if p > 0.0 && p < 1.0 {
            1.0
        } else {
            0.0
        }
    }
}

/// `Beta(alpha, beta)` density on `(0, 1)`.
///
/// Serializes as its two shape parameters; deserializing goes through
/// [`BetaPrior::new`], which validates them and recomputes the normalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "BetaShape"))]
pub struct BetaPrior {
    alpha: f64,
    beta: f64,
    #[cfg_attr(feature = "serde", serde(skip))]
    ln_norm: f64,
}

impl BetaPrior {
    /// Both shape parameters must be finite and positive.
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        for (name, v) in [("alpha", alpha), ("beta", beta)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::InvalidInput(format!(
                    "Beta prior {name} must be positive, got {v}"
                )));
            }
        }
        Ok(Self {
            alpha,
            beta,
            ln_norm: ln_gamma(alpha + beta) - ln_gamma(alpha) - ln_gamma(beta),
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Monte Carlo draws of patience from this prior (seeded, reproducible).
    #[cfg(feature = "stochastic")]
    pub fn sample_patience(&self, n: usize, seed: u64) -> Result<Vec<f64>> {
        use rand::rngs::StdRng;
        use rand::SeedableRng;
        use rand_distr::{Beta, Distribution};

        let dist = Beta::new(self.alpha, self.beta)
            .map_err(|e| Error::InvalidInput(format!("Beta prior: {e}")))?;
        let mut rng = StdRng::seed_from_u64(seed);
        Ok((0..n).map(|_| dist.sample(&mut rng)).collect())
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct BetaShape {
    alpha: f64,
    beta: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<BetaShape> for BetaPrior {
    type Error = Error;

    fn try_from(shape: BetaShape) -> Result<Self> {
        Self::new(shape.alpha, shape.beta)
    }
}

impl PriorDensity for BetaPrior {
    fn density(&self, p: f64) -> f64 {
        if !(p > 0.0 && p < 1.0) {
            return 0.0;
        }
        ((self.alpha - 1.0) * p.ln() + (self.beta - 1.0) * (-p).ln_1p() + self.ln_norm).exp()
    }
}

/// Lanczos approximation of `ln Γ(x)` for `x > 0`.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for (i, &c) in COEFFS.iter().enumerate() {
        ser += c / (x + 1.0 + i as f64);
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

/// One grid point of a posterior, in ascending metric order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosteriorPoint {
    /// Metric value at this patience.
    pub value: f64,
    pub patience: f64,
    /// `density(patience) * step`.
    pub weight: f64,
    /// Running sum of `weight` up to and including this point.
    pub cumulative: f64,
}

/// Weighted empirical CDF of a metric.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosteriorCurve {
    points: Vec<PosteriorPoint>,
}

impl PosteriorCurve {
    /// Reweight a metric curve by `prior` over `grid`.
    pub fn from_curve<P: PriorDensity + ?Sized>(
        values: &[f64],
        grid: &ParameterGrid,
        prior: &P,
    ) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(logp::Error::LengthMismatch(values.len(), grid.len()).into());
        }
        let step = grid.step();
        let mut points = Vec::with_capacity(values.len());
        for (&value, p) in values.iter().zip(grid.points()) {
            let d = prior.density(p.get());
            if !(d.is_finite() && d >= 0.0) {
                return Err(Error::InvalidInput(format!(
                    "prior density at {} is {d}",
                    p.get()
                )));
            }
            points.push(PosteriorPoint {
                value,
                patience: p.get(),
                weight: d * step,
                cumulative: 0.0,
            });
        }
        // Stable: equal metric values keep grid order.
        points.sort_by(|a, b| a.value.total_cmp(&b.value));
        let mut acc = 0.0;
        for pt in &mut points {
            acc += pt.weight;
            pt.cumulative = acc;
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[PosteriorPoint] {
        &self.points
    }

    /// Prior mass captured by the grid (the final cumulative weight).
    pub fn total_weight(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.cumulative)
    }

    /// Posterior mean of the metric; `None` without mass.
    pub fn mean(&self) -> Option<f64> {
        let total = self.total_weight();
        if total <= 0.0 {
            return None;
        }
        Some(self.points.iter().map(|p| p.value * p.weight).sum::<f64>() / total)
    }

    /// Normalized `P(metric <= x)`.
    pub fn cdf(&self, x: f64) -> f64 {
        let total = self.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        let idx = self.points.partition_point(|p| p.value <= x);
        if idx == 0 {
            0.0
        } else {
            self.points[idx - 1].cumulative / total
        }
    }

    /// Smallest metric value whose normalized cumulative weight reaches `q`.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let total = self.total_weight();
        if total <= 0.0 || !(0.0..=1.0).contains(&q) {
            return None;
        }
        let target = q * total - CUMULATIVE_EPS * total;
        let idx = self.points.partition_point(|p| p.cumulative < target);
        self.points
            .get(idx.min(self.points.len() - 1))
            .map(|p| p.value)
    }

    /// Equal-tailed credible interval at `level` (e.g. `0.95`).
    pub fn credible_interval(&self, level: f64) -> Option<(f64, f64)> {
        if !(level > 0.0 && level < 1.0) {
            return None;
        }
        let tail = (1.0 - level) / 2.0;
        Some((self.quantile(tail)?, self.quantile(1.0 - tail)?))
    }

    /// Draw metric values from the normalized curve by inverse-CDF sampling.
    #[cfg(feature = "stochastic")]
    pub fn sample(&self, n: usize, seed: u64) -> Vec<f64> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let total = self.total_weight();
        if total <= 0.0 {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let last = self.points.len() - 1;
        (0..n)
            .map(|_| {
                let u: f64 = rng.random::<f64>() * total;
                let idx = self.points.partition_point(|p| p.cumulative <= u);
                self.points[idx.min(last)].value
            })
            .collect()
    }
}

/// Posterior curve for every group; `None` where the group's mean is undefined.
pub fn posterior<G, P>(
    curves: &MetricCurves<G>,
    prior: &P,
) -> Result<BTreeMap<G, Option<PosteriorCurve>>>
where
    G: Ord + Clone,
    P: PriorDensity + ?Sized,
{
    let mut out = BTreeMap::new();
    let mut mass = None;
    for (group, curve) in curves.iter() {
        let post = match curve.values() {
            Some(values) => {
                let pc = PosteriorCurve::from_curve(values, curves.grid(), prior)?;
                mass.get_or_insert(pc.total_weight());
                Some(pc)
            }
            None => None,
        };
        out.insert(group.clone(), post);
    }
    if let Some(m) = mass {
        if (1.0 - m).abs() > MASS_WARN_TOL {
            warn!(mass = m, "prior places noticeable mass outside the grid");
        }
        debug!(groups = out.len(), mass = m, "computed posterior curves");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> ParameterGrid {
        ParameterGrid::with_resolution(n).unwrap()
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        for (x, fact) in [(1.0, 1.0), (2.0, 1.0), (5.0, 24.0), (7.0, 720.0)] {
            assert!((ln_gamma(x) - f64::ln(fact)).abs() < 1e-8, "x={x}");
        }
    }

    #[test]
    fn beta_density_integrates_to_about_one() {
        let g = grid(2000);
        for (a, b) in [(1.0, 1.0), (2.0, 5.0), (8.0, 2.0)] {
            let prior = BetaPrior::new(a, b).unwrap();
            let mass: f64 = g.points().iter().map(|p| prior.density(p.get()) * g.step()).sum();
            assert!((mass - 1.0).abs() < 1e-2, "Beta({a},{b}) mass {mass}");
        }
        assert!(BetaPrior::new(0.0, 1.0).is_err());
        assert_eq!(BetaPrior::new(2.0, 2.0).unwrap().density(1.0), 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn beta_prior_round_trips_through_json() {
        let prior = BetaPrior::new(2.0, 5.0).unwrap();
        let json = serde_json::to_string(&prior).unwrap();
        let back: BetaPrior = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prior);
        // Beta(2, 5) at 0.2: 30 * 0.2 * 0.8^4
        assert!((back.density(0.2) - 2.4576).abs() < 1e-9);

        let bad: std::result::Result<BetaPrior, _> =
            serde_json::from_str(r#"{"alpha":0.0,"beta":1.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn curve_is_sorted_and_monotone() {
        let g = grid(5);
        // Non-monotone in patience on purpose.
        let values = [0.3, 0.1, 0.4, 0.2];
        let pc = PosteriorCurve::from_curve(&values, &g, &UniformPrior).unwrap();
        let vals: Vec<f64> = pc.points().iter().map(|p| p.value).collect();
        assert_eq!(vals, vec![0.1, 0.2, 0.3, 0.4]);
        assert!(pc.points().windows(2).all(|w| w[0].cumulative <= w[1].cumulative));
        // 4 interior points of a 5-step grid with uniform density: 0.8 total.
        assert!((pc.total_weight() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn summaries_on_uniform_weights() {
        let g = grid(5);
        let pc = PosteriorCurve::from_curve(&[0.1, 0.2, 0.3, 0.4], &g, &UniformPrior).unwrap();
        assert!((pc.mean().unwrap() - 0.25).abs() < 1e-12);
        assert!((pc.cdf(0.2) - 0.5).abs() < 1e-12);
        assert_eq!(pc.cdf(0.0), 0.0);
        assert_eq!(pc.cdf(1.0), 1.0);
        assert_eq!(pc.quantile(0.5), Some(0.2));
        assert_eq!(pc.quantile(1.0), Some(0.4));
        assert_eq!(pc.credible_interval(0.5), Some((0.1, 0.3)));
        assert_eq!(pc.quantile(1.5), None);
    }

    #[test]
    fn closures_work_as_priors() {
        let g = grid(4);
        let pc = PosteriorCurve::from_curve(&[1.0, 2.0, 3.0], &g, &|p: f64| 2.0 * p).unwrap();
        // 2 * (0.25 + 0.5 + 0.75) * 0.25
        assert!((pc.total_weight() - 0.75).abs() < 1e-12);
        assert!(PosteriorCurve::from_curve(&[1.0, 2.0, 3.0], &g, &|_p: f64| -1.0).is_err());
        assert!(PosteriorCurve::from_curve(&[1.0], &g, &UniformPrior).is_err());
    }

    #[cfg(feature = "stochastic")]
    #[test]
    fn sampling_is_seeded_and_stays_on_support() {
        let g = grid(5);
        let pc = PosteriorCurve::from_curve(&[0.1, 0.2, 0.3, 0.4], &g, &UniformPrior).unwrap();
        let a = pc.sample(200, 7);
        assert_eq!(a, pc.sample(200, 7));
        assert!(a.iter().all(|v| [0.1, 0.2, 0.3, 0.4].contains(v)));
        let mean = a.iter().sum::<f64>() / a.len() as f64;
        assert!((mean - 0.25).abs() < 0.05, "mean={mean}");
    }

    #[cfg(feature = "stochastic")]
    #[test]
    fn beta_draws_match_prior_mean() {
        let prior = BetaPrior::new(8.0, 2.0).unwrap();
        let draws = prior.sample_patience(4000, 11).unwrap();
        assert!(draws.iter().all(|&p| p > 0.0 && p < 1.0));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - prior.mean()).abs() < 0.02, "mean={mean}");
    }
}
