//! Exposure fairness statistics: Gini, KL-divergence and L2 loss against an ideal target.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::discount::test_weight;
use crate::{Catalog, Error, ExposureDistribution, Patience, Population, Result, Truth};

fn check_non_negative(values: &[f64]) -> Result<()> {
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() || v < 0.0 {
            return Err(Error::InvalidInput(format!(
                "entry {i} is {v}; expected a finite non-negative value"
            )));
        }
    }
    Ok(())
}

/// Gini coefficient of a non-negative vector.
///
/// Rank-based closed form over ascending values (rank 1 = smallest, ties keep input
/// order):
///
/// ```text
/// G = (N + 1) / (N - 1) - 2 / (N (N - 1) mean) * sum_i (N + 1 - rank_i) x_i
/// ```
///
/// `0` for a uniform vector (and for a single entry); approaches `1` as mass
/// concentrates on one entry. An all-zero vector is [`Error::Undefined`].
pub fn gini(values: &[f64]) -> Result<f64> {
    check_non_negative(values)?;
    let n = values.len();
    if n == 0 {
        return Err(Error::Undefined("Gini of an empty vector".to_string()));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(Error::Undefined("Gini of an all-zero vector".to_string()));
    }
    if n == 1 {
        return Ok(0.0);
    }

    // `sort_by` is stable: tied values stay in first-observed order.
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let nf = n as f64;
    let mean = total / nf;
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| (nf - i as f64) * x)
        .sum();
    let g = (nf + 1.0) / (nf - 1.0) - 2.0 * weighted / (nf * (nf - 1.0) * mean);
    Ok(g.clamp(0.0, 1.0))
}

fn check_lengths(p: &[f64], q: &[f64]) -> Result<()> {
    if p.len() != q.len() {
        return Err(logp::Error::LengthMismatch(p.len(), q.len()).into());
    }
    Ok(())
}

/// `KL(p || q) = sum_i p_i ln(p_i / q_i)` between two distributions.
///
/// Both inputs must be simplices within `tol`. Terms with `p_i = 0` contribute 0; a
/// term with `q_i = 0 < p_i` is [`Error::InvalidComparison`] instead of `+inf`.
pub fn kl_divergence(p: &[f64], q: &[f64], tol: f64) -> Result<f64> {
    check_lengths(p, q)?;
    for (index, (&observed, &qi)) in p.iter().zip(q).enumerate() {
        if observed > 0.0 && qi <= 0.0 {
            return Err(Error::InvalidComparison { index, observed });
        }
    }
    // Gibbs: KL >= 0; absorb rounding below zero.
    Ok(logp::kl_divergence(p, q, tol)?.max(0.0))
}

/// Squared L2 distance `sum_i (p_i - q_i)^2`.
pub fn l2_loss(p: &[f64], q: &[f64]) -> Result<f64> {
    check_lengths(p, q)?;
    Ok(p.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum())
}

/// The exposure distribution of an ideal ranker.
///
/// Every population user carries one unit of discounted attention
/// (`(1 - p) * sum_r p^(r-1) = 1`). A user with `m` relevant items places them first,
/// so each gets `(1 - p) * test_weight(m) = (1 - p^m) / m`; the remaining `p^m` is
/// spread uniformly over the whole catalog. Users without relevant items spread
/// their whole unit uniformly.
///
/// Relevance for users outside the population, or for items outside the catalog, is
/// an input error.
pub fn ideal_exposure(
    truth: &Truth,
    population: &Population,
    catalog: &Catalog,
    patience: Patience,
) -> Result<ExposureDistribution> {
    if catalog.is_empty() {
        return Err(Error::Undefined("ideal exposure over an empty catalog".to_string()));
    }
    if population.is_empty() {
        return Err(Error::Undefined(
            "ideal exposure over an empty population".to_string(),
        ));
    }
    if let Some(user) = truth.users().find(|u| !population.contains(u)) {
        return Err(Error::InvalidInput(format!(
            "relevance for user {user} outside the evaluation population"
        )));
    }

    let p = patience.get();
    let n_items = catalog.len() as f64;
    let mut mass = vec![0.0; catalog.len()];
    let mut uniform = 0.0;
    for user in population.iter() {
        let rel = truth.get(user);
        let m = rel.map_or(0, |r| r.len());
        if let Some(rel) = rel {
            let each = (1.0 - p) * test_weight(m, patience);
            for (item, _) in rel.iter() {
                mass[catalog.require(item)?] += each;
            }
        }
        uniform += p.powi(m.min(i32::MAX as usize) as i32) / n_items;
    }
    let n_users = population.len() as f64;
    let expected: Vec<f64> = mass.iter().map(|m| (m + uniform) / n_users).collect();
    trace!(uniform_share = uniform / n_users, "built ideal exposure target");
    ExposureDistribution::from_expected("ideal", catalog, expected)
}

/// Fairness statistics for one algorithm against a target.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FairnessSummary {
    pub gini: f64,
    pub kl: f64,
    pub l2: f64,
}

/// Gini of `exposure`, plus KL and L2 against `target`. Both must share one catalog.
pub fn fairness_summary(
    exposure: &ExposureDistribution,
    target: &ExposureDistribution,
    tol: f64,
) -> Result<FairnessSummary> {
    if exposure.items() != target.items() {
        return Err(Error::InvalidInput(format!(
            "{} and {} are laid out over different catalogs",
            exposure.algorithm(),
            target.algorithm()
        )));
    }
    let p = exposure.values();
    let q = target.values();
    Ok(FairnessSummary {
        gini: gini(p)?,
        kl: kl_divergence(p, q, tol)?,
        l2: l2_loss(p, q)?,
    })
}

/// [`fairness_summary`] for every algorithm.
pub fn fairness_by_algorithm(
    exposures: &BTreeMap<String, ExposureDistribution>,
    target: &ExposureDistribution,
    tol: f64,
) -> Result<BTreeMap<String, FairnessSummary>> {
    let out = exposures
        .iter()
        .map(|(algo, d)| fairness_summary(d, target, tol).map(|s| (algo.clone(), s)))
        .collect::<Result<BTreeMap<_, _>>>()?;
    debug!(algorithms = out.len(), "computed fairness summaries");
    Ok(out)
}
