//! Expected exposure per item.
//!
//! An item's expected exposure under one algorithm is the mean, over the *whole*
//! evaluation population, of the attention `p^(rank-1)` it received in each user's
//! list (0 for users whose list does not contain it). Averaging only over recipients
//! would overstate exposure for items shown to few users.
//!
//! The vector is laid out over the full [`Catalog`] (never-recommended items get 0)
//! and normalized to sum to 1 so algorithms and the ideal target are comparable.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use crate::discount::rank_weight;
use crate::{Catalog, Error, Patience, Population, RecList, Result};

/// Per-item exposure for one algorithm, in catalog order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExposureDistribution {
    algorithm: String,
    items: Vec<String>,
    /// Population-mean attention before normalization.
    expected: Vec<f64>,
    /// `expected` scaled to sum to 1.
    normalized: Vec<f64>,
}

impl ExposureDistribution {
    /// Normalize `expected` (catalog order) into a distribution.
    pub(crate) fn from_expected(
        algorithm: impl Into<String>,
        catalog: &Catalog,
        expected: Vec<f64>,
    ) -> Result<Self> {
        let algorithm = algorithm.into();
        let mut normalized = expected.clone();
        logp::normalize_in_place(&mut normalized).map_err(|e| match e {
            logp::Error::Empty | logp::Error::Domain(_) => {
                Error::Undefined(format!("{algorithm} exposes no catalog item"))
            }
            other => Error::Simplex(other),
        })?;
        Ok(Self {
            algorithm,
            items: catalog.items().to_vec(),
            expected,
            normalized,
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Normalized exposure, aligned with [`ExposureDistribution::items`].
    pub fn values(&self) -> &[f64] {
        &self.normalized
    }

    /// Unnormalized population-mean attention.
    pub fn expected(&self) -> &[f64] {
        &self.expected
    }

    /// Normalized exposure of one item.
    pub fn get(&self, item: &str) -> Option<f64> {
        self.items
            .iter()
            .position(|i| i == item)
            .map(|idx| self.normalized[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.items
            .iter()
            .map(String::as_str)
            .zip(self.normalized.iter().copied())
    }
}

/// Expected exposure of every catalog item under `algorithm`.
///
/// Errors:
/// - [`Error::InvalidInput`]: a list for another algorithm, a user outside the population,
///   two lists for one user, or an item outside the catalog.
/// - [`Error::Undefined`]: empty population, or no attention at all to normalize.
#[instrument(skip_all, fields(algorithm = algorithm, lists = recs.len()))]
pub fn expected_exposure(
    algorithm: &str,
    recs: &[RecList],
    population: &Population,
    catalog: &Catalog,
    patience: Patience,
) -> Result<ExposureDistribution> {
    if population.is_empty() {
        return Err(Error::Undefined(format!(
            "exposure for {algorithm}: empty evaluation population"
        )));
    }

    let mut sums = vec![0.0; catalog.len()];
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for list in recs {
        if list.algorithm() != algorithm {
            return Err(Error::InvalidInput(format!(
                "list from {} passed to exposure for {algorithm}",
                list.algorithm()
            )));
        }
        if !population.contains(list.user()) {
            return Err(Error::InvalidInput(format!(
                "{algorithm}: user {} is outside the evaluation population",
                list.user()
            )));
        }
        if !seen.insert(list.user()) {
            return Err(Error::InvalidInput(format!(
                "{algorithm}: two lists for user {}",
                list.user()
            )));
        }
        for it in list.items() {
            let idx = catalog.require(&it.item)?;
            sums[idx] += rank_weight(it.rank, patience);
        }
    }

    let n_users = population.len() as f64;
    let expected: Vec<f64> = sums.iter().map(|s| s / n_users).collect();
    debug!(
        users_with_lists = seen.len(),
        population = population.len(),
        catalog = catalog.len(),
        "accumulated expected exposure"
    );
    ExposureDistribution::from_expected(algorithm, catalog, expected)
}

/// [`expected_exposure`] for every algorithm present in `recs`.
pub fn exposure_by_algorithm(
    recs: &[RecList],
    population: &Population,
    catalog: &Catalog,
    patience: Patience,
) -> Result<BTreeMap<String, ExposureDistribution>> {
    let mut grouped: BTreeMap<&str, Vec<RecList>> = BTreeMap::new();
    for list in recs {
        grouped.entry(list.algorithm()).or_default().push(list.clone());
    }
    grouped
        .into_iter()
        .map(|(algo, lists)| {
            expected_exposure(algo, &lists, population, catalog, patience)
                .map(|d| (algo.to_string(), d))
        })
        .collect()
}
