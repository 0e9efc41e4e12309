//! Mean RBP as a function of patience, per group.
//!
//! For every group `g` and grid point `p`:
//!
//! ```text
//! mean_rbp_g(p) = (1 - p) / N_g * sum_{events e in g} p^(rank_e - 1)
//! ```
//!
//! where an *event* is a recommended item that was relevant to its user and `N_g` is
//! the number of users in the group's full population (users without events dilute
//! the mean). Terms span hundreds of orders of magnitude across the grid, so each
//! group is reduced in log space:
//!
//! ```text
//! ln mean_rbp_g(p) = LSE_e[(rank_e - 1) ln p] + ln(1 - p) - ln N_g
//! ```
//!
//! and exponentiated only at the end. Groups are independent of each other and share
//! only the read-only grid.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, trace};

use crate::{Error, GroupKey, ParameterGrid, Population, RecList, Result, Truth};

/// A recommended item that was relevant to its user.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelevantEvent<G> {
    pub group: G,
    pub user: String,
    pub rank: usize,
}

/// Per-group curve over the grid.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeanCurve {
    /// Mean per-user metric at each grid point.
    Defined(Vec<f64>),
    /// The group has no users in its population; the mean does not exist.
    Undefined,
}

impl MeanCurve {
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            MeanCurve::Defined(v) => Some(v),
            MeanCurve::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MeanCurve::Defined(_))
    }
}

/// Curves for every group over one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCurves<G> {
    grid: ParameterGrid,
    curves: BTreeMap<G, MeanCurve>,
}

impl<G: Ord> MetricCurves<G> {
    pub fn grid(&self) -> &ParameterGrid {
        &self.grid
    }

    pub fn get(&self, group: &G) -> Option<&MeanCurve> {
        self.curves.get(group)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&G, &MeanCurve)> {
        self.curves.iter()
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

/// Log-domain RBP-vs-patience engine.
#[derive(Debug, Clone, Default)]
pub struct UncertainRbp {
    grid: ParameterGrid,
}

impl UncertainRbp {
    pub fn new(grid: ParameterGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &ParameterGrid {
        &self.grid
    }

    /// Compute curves for every group appearing in `events` or `group_sizes`.
    ///
    /// - A group with size 0 (or absent from `group_sizes`) but with events, or with size
    ///   0 and no events, gets [`MeanCurve::Undefined`].
    /// - A group with users but no events gets a curve of zeros.
    ///
    /// Errors with [`Error::InvalidInput`] on rank 0, a repeated `(user, rank)` within a
    /// group, or more distinct event users than the group's population.
    #[instrument(skip_all, fields(events = events.len(), groups = group_sizes.len(), grid = self.grid.len()))]
    pub fn compute<G>(
        &self,
        events: &[RelevantEvent<G>],
        group_sizes: &BTreeMap<G, usize>,
    ) -> Result<MetricCurves<G>>
    where
        G: Ord + Clone + std::fmt::Debug,
    {
        let mut by_group: BTreeMap<&G, Vec<usize>> = BTreeMap::new();
        let mut seen: BTreeMap<&G, BTreeSet<(&str, usize)>> = BTreeMap::new();
        for e in events {
            if e.rank == 0 {
                return Err(Error::InvalidInput(format!(
                    "{:?}/{}: non-positive rank",
                    e.group, e.user
                )));
            }
            if !seen.entry(&e.group).or_default().insert((e.user.as_str(), e.rank)) {
                return Err(Error::InvalidInput(format!(
                    "{:?}/{}: rank {} appears twice",
                    e.group, e.user, e.rank
                )));
            }
            by_group.entry(&e.group).or_default().push(e.rank);
        }

        // Per-point constants shared by every group.
        let ln_p: Vec<f64> = self.grid.points().iter().map(|p| p.ln()).collect();
        let ln_norm: Vec<f64> = self
            .grid
            .points()
            .iter()
            .map(|p| p.ln_complement())
            .collect();

        let mut curves: BTreeMap<G, MeanCurve> = BTreeMap::new();
        for (group, &n_users) in group_sizes {
            if n_users == 0 {
                curves.insert(group.clone(), MeanCurve::Undefined);
            }
        }
        for group in by_group.keys() {
            if !group_sizes.contains_key(*group) {
                curves.insert((*group).clone(), MeanCurve::Undefined);
            }
        }

        for (group, &n_users) in group_sizes.iter().filter(|(_, n)| **n > 0) {
            let ranks = by_group.get(group).map(Vec::as_slice).unwrap_or(&[]);
            let event_users = seen
                .get(group)
                .map(|s| s.iter().map(|(u, _)| *u).collect::<BTreeSet<_>>().len())
                .unwrap_or(0);
            if event_users > n_users {
                return Err(Error::InvalidInput(format!(
                    "{group:?}: {event_users} users with events but population of {n_users}"
                )));
            }
            let ln_n = (n_users as f64).ln();
            let values = ln_p
                .iter()
                .zip(&ln_norm)
                .map(|(&lp, &lnorm)| {
                    let lse = logp::log_sum_exp_iter(ranks.iter().map(|&r| (r - 1) as f64 * lp));
                    (lse + lnorm - ln_n).exp()
                })
                .collect();
            trace!(?group, events = ranks.len(), n_users, "reduced group");
            curves.insert(group.clone(), MeanCurve::Defined(values));
        }

        let undefined = curves.values().filter(|c| !c.is_defined()).count();
        debug!(groups = curves.len(), undefined, "computed patience curves");
        Ok(MetricCurves {
            grid: self.grid.clone(),
            curves,
        })
    }

    /// Curves per algorithm over the full `population`, from ranked lists and truth.
    ///
    /// Lists for users outside the population, or two lists for one
    /// `(algorithm, user)`, are input errors.
    pub fn by_algorithm(
        &self,
        recs: &[RecList],
        truth: &Truth,
        population: &Population,
        depth: Option<usize>,
    ) -> Result<MetricCurves<GroupKey>> {
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        for list in recs {
            if !population.contains(list.user()) {
                return Err(Error::InvalidInput(format!(
                    "{}: user {} is outside the evaluation population",
                    list.algorithm(),
                    list.user()
                )));
            }
            if !seen.insert((list.algorithm(), list.user())) {
                return Err(Error::InvalidInput(format!(
                    "{}: two lists for user {}",
                    list.algorithm(),
                    list.user()
                )));
            }
        }

        let key = |algo: &str, _user: &str| Some(GroupKey::algorithm(algo));
        let algorithms: BTreeSet<&str> = recs.iter().map(RecList::algorithm).collect();
        let events = relevant_events(recs, truth, depth, key);
        let sizes = group_sizes(algorithms, population, key);
        self.compute(&events, &sizes)
    }
}

/// Collect relevant events from ranked lists, keyed by `key(algorithm, user)`.
///
/// Users for which `key` returns `None` are skipped. Items beyond `depth` are ignored.
pub fn relevant_events<G, F>(
    recs: &[RecList],
    truth: &Truth,
    depth: Option<usize>,
    key: F,
) -> Vec<RelevantEvent<G>>
where
    G: Clone,
    F: Fn(&str, &str) -> Option<G>,
{
    let mut out = Vec::new();
    for list in recs {
        let Some(rel) = truth.get(list.user()) else {
            continue;
        };
        let Some(group) = key(list.algorithm(), list.user()) else {
            continue;
        };
        for it in list.top(depth) {
            if rel.contains(&it.item) {
                out.push(RelevantEvent {
                    group: group.clone(),
                    user: list.user().to_string(),
                    rank: it.rank,
                });
            }
        }
    }
    out
}

/// Full-population size of every group: each `(algorithm, user)` pair counted once
/// under `key(algorithm, user)`.
pub fn group_sizes<'a, G, A, F>(algorithms: A, population: &Population, key: F) -> BTreeMap<G, usize>
where
    G: Ord,
    A: IntoIterator<Item = &'a str>,
    F: Fn(&str, &str) -> Option<G>,
{
    let mut sizes = BTreeMap::new();
    for algo in algorithms {
        for user in population.iter() {
            if let Some(g) = key(algo, user) {
                *sizes.entry(g).or_insert(0) += 1;
            }
        }
    }
    sizes
}
