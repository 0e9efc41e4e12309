//! Per-user list metrics and the metric registry.
//!
//! [`RecListAnalysis`] holds a set of named [`ListMetric`]s, each with its own truncation
//! depth, and scores every recommendation list into a [`MetricTable`].
//!
//! Two policies are fixed here rather than left to individual metrics:
//! - a user with no relevant items scores `0` on every metric (never `NaN`);
//! - "include missing" is an explicit outer join against a [`Population`]
//!   ([`MetricTable::fill_missing`]), so users an algorithm skipped still count.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, instrument};

use crate::discount::rank_weight;
use crate::{
    EvalConfig, Error, Patience, Population, RankedItem, RecList, RelevanceSet, Result, Truth,
};

/// A per-list accuracy metric.
///
/// `recs` is already truncated to `k`; `k` is passed for metrics whose ideal
/// depends on it (nDCG, recall). Implementations should return a finite value.
pub trait ListMetric: Send + Sync {
    /// Default column name.
    fn name(&self) -> &str;

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, k: Option<usize>) -> f64;
}

/// Rank-biased precision: `(1 - p) * sum_{relevant} p^(rank-1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rbp {
    pub patience: Patience,
}

impl Rbp {
    pub fn new(patience: Patience) -> Self {
        Self { patience }
    }
}

impl ListMetric for Rbp {
    fn name(&self) -> &str {
        "rbp"
    }

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, _k: Option<usize>) -> f64 {
        let disc: f64 = recs
            .iter()
            .filter(|it| truth.contains(&it.item))
            .map(|it| rank_weight(it.rank, self.patience))
            .sum();
        disc * (1.0 - self.patience.get())
    }
}

/// Normalized DCG with graded gains and a `log2(max(rank, 2))` discount.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ndcg;

fn log2_discount(rank: usize) -> f64 {
    (rank.max(2) as f64).log2()
}

impl ListMetric for Ndcg {
    fn name(&self) -> &str {
        "ndcg"
    }

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, k: Option<usize>) -> f64 {
        let dcg: f64 = recs
            .iter()
            .filter_map(|it| truth.weight(&it.item).map(|g| g / log2_discount(it.rank)))
            .sum();

        let mut gains: Vec<f64> = truth.iter().map(|(_, g)| g).collect();
        gains.sort_by(|a, b| b.total_cmp(a));
        let take = k.unwrap_or(gains.len());
        let idcg: f64 = gains
            .iter()
            .take(take)
            .enumerate()
            .map(|(i, g)| g / log2_discount(i + 1))
            .sum();

        if idcg > 0.0 {
            dcg / idcg
        } else {
            0.0
        }
    }
}

/// Reciprocal rank of the first relevant item.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipRank;

impl ListMetric for RecipRank {
    fn name(&self) -> &str {
        "recip_rank"
    }

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, _k: Option<usize>) -> f64 {
        recs.iter()
            .find(|it| truth.contains(&it.item))
            .map_or(0.0, |it| 1.0 / it.rank as f64)
    }
}

/// 1 if any relevant item was recommended, else 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hit;

impl ListMetric for Hit {
    fn name(&self) -> &str {
        "hit"
    }

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, _k: Option<usize>) -> f64 {
        if recs.iter().any(|it| truth.contains(&it.item)) {
            1.0
        } else {
            0.0
        }
    }
}

fn relevant_count(recs: &[RankedItem], truth: &RelevanceSet) -> usize {
    recs.iter().filter(|it| truth.contains(&it.item)).count()
}

/// Fraction of recommended items that are relevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Precision;

impl ListMetric for Precision {
    fn name(&self) -> &str {
        "precision"
    }

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, _k: Option<usize>) -> f64 {
        if recs.is_empty() {
            return 0.0;
        }
        relevant_count(recs, truth) as f64 / recs.len() as f64
    }
}

/// Fraction of attainable relevant items recommended (`|truth|` capped at `k`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Recall;

impl ListMetric for Recall {
    fn name(&self) -> &str {
        "recall"
    }

    fn score(&self, recs: &[RankedItem], truth: &RelevanceSet, k: Option<usize>) -> f64 {
        let attainable = k.map_or(truth.len(), |k| truth.len().min(k));
        if attainable == 0 {
            return 0.0;
        }
        relevant_count(recs, truth) as f64 / attainable as f64
    }
}

struct Registered {
    name: String,
    k: Option<usize>,
    metric: Box<dyn ListMetric>,
}

impl fmt::Debug for Registered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registered")
            .field("name", &self.name)
            .field("k", &self.k)
            .finish()
    }
}

/// Registry of named metrics, applied to every list.
#[derive(Debug, Default)]
pub struct RecListAnalysis {
    metrics: Vec<Registered>,
}

impl RecListAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used for the reference runs: `rbp`, `ndcg`, `recip_rank` and `hit` at
    /// depth `k`, plus `hit10` and `hit20`.
    pub fn standard(patience: Patience, k: Option<usize>) -> Self {
        let mut rla = Self::new();
        rla.metrics.extend([
            Registered {
                name: "rbp".to_string(),
                k,
                metric: Box::new(Rbp::new(patience)),
            },
            Registered {
                name: "ndcg".to_string(),
                k,
                metric: Box::new(Ndcg),
            },
            Registered {
                name: "recip_rank".to_string(),
                k,
                metric: Box::new(RecipRank),
            },
            Registered {
                name: "hit".to_string(),
                k,
                metric: Box::new(Hit),
            },
            Registered {
                name: "hit10".to_string(),
                k: Some(10),
                metric: Box::new(Hit),
            },
            Registered {
                name: "hit20".to_string(),
                k: Some(20),
                metric: Box::new(Hit),
            },
        ]);
        rla
    }

    /// [`RecListAnalysis::standard`] with patience and depth taken from `cfg`.
    pub fn from_config(cfg: &EvalConfig) -> Result<Self> {
        Ok(Self::standard(cfg.patience()?, cfg.depth))
    }

    /// Register a metric under its default name.
    pub fn add_metric<M: ListMetric + 'static>(
        &mut self,
        metric: M,
        k: Option<usize>,
    ) -> Result<&mut Self> {
        let name = metric.name().to_string();
        self.add_named_metric(name, metric, k)
    }

    /// Register a metric under an explicit column name (e.g. `hit10`).
    pub fn add_named_metric<M: ListMetric + 'static>(
        &mut self,
        name: impl Into<String>,
        metric: M,
        k: Option<usize>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.metrics.iter().any(|m| m.name == name) {
            return Err(Error::InvalidInput(format!("metric {name} registered twice")));
        }
        self.metrics.push(Registered {
            name,
            k,
            metric: Box::new(metric),
        });
        Ok(self)
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }

    fn score_list(&self, list: &RecList, truth: Option<&RelevanceSet>) -> Vec<f64> {
        match truth {
            Some(t) if !t.is_empty() => self
                .metrics
                .iter()
                .map(|m| m.metric.score(list.top(m.k), t, m.k))
                .collect(),
            // No relevant items: defined as 0 for every metric.
            _ => vec![0.0; self.metrics.len()],
        }
    }

    /// Score every list. Only `(algorithm, user)` pairs with a list get a row.
    ///
    /// Two lists for the same `(algorithm, user)` are an input error.
    #[instrument(skip_all, fields(lists = recs.len(), metrics = self.metrics.len()))]
    pub fn compute(&self, recs: &[RecList], truth: &Truth) -> Result<MetricTable> {
        let mut table = MetricTable::new(self.metric_names());
        for list in recs {
            let key = (list.algorithm().to_string(), list.user().to_string());
            if table.rows.contains_key(&key) {
                return Err(Error::InvalidInput(format!(
                    "duplicate list for algorithm {} user {}",
                    key.0, key.1
                )));
            }
            let row = self.score_list(list, truth.get(list.user()));
            table.rows.insert(key, row);
        }
        debug!(
            rows = table.len(),
            algorithms = table.algorithms().len(),
            "scored recommendation lists"
        );
        Ok(table)
    }

    /// Score every list, then outer-join against `population` so every user has a
    /// row for every algorithm seen in `recs` (missing rows score 0).
    ///
    /// Lists for users outside the population are an input error.
    pub fn compute_including_missing(
        &self,
        recs: &[RecList],
        truth: &Truth,
        population: &Population,
    ) -> Result<MetricTable> {
        if let Some(list) = recs.iter().find(|l| !population.contains(l.user())) {
            return Err(Error::InvalidInput(format!(
                "algorithm {} recommended for user {} outside the evaluation population",
                list.algorithm(),
                list.user()
            )));
        }
        let mut table = self.compute(recs, truth)?;
        let algorithms: Vec<String> = table.algorithms().into_iter().collect();
        let added = table.fill_missing(algorithms.iter().map(String::as_str), population, 0.0);
        debug!(added, "filled rows for users without recommendations");
        Ok(table)
    }

    /// Dispatch on `cfg.include_missing`, using the truth users as the population.
    pub fn run(&self, recs: &[RecList], truth: &Truth, cfg: &EvalConfig) -> Result<MetricTable> {
        if cfg.include_missing {
            self.compute_including_missing(recs, truth, &Population::from_truth(truth))
        } else {
            self.compute(recs, truth)
        }
    }
}

/// Per-`(algorithm, user)` metric values, one column per registered metric.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricTable {
    metrics: Vec<String>,
    rows: BTreeMap<(String, String), Vec<f64>>,
}

impl MetricTable {
    pub fn new(metrics: Vec<String>) -> Self {
        Self {
            metrics,
            rows: BTreeMap::new(),
        }
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metrics
    }

    fn column(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    pub fn get(&self, algorithm: &str, user: &str, metric: &str) -> Option<f64> {
        let col = self.column(metric)?;
        self.rows
            .get(&(algorithm.to_string(), user.to_string()))
            .map(|row| row[col])
    }

    pub fn row(&self, algorithm: &str, user: &str) -> Option<&[f64]> {
        self.rows
            .get(&(algorithm.to_string(), user.to_string()))
            .map(Vec::as_slice)
    }

    pub fn algorithms(&self) -> BTreeSet<String> {
        self.rows.keys().map(|(a, _)| a.clone()).collect()
    }

    pub fn users(&self, algorithm: &str) -> Vec<&str> {
        self.rows
            .keys()
            .filter(|(a, _)| a == algorithm)
            .map(|(_, u)| u.as_str())
            .collect()
    }

    /// All values of one metric for one algorithm, in user order.
    pub fn values(&self, algorithm: &str, metric: &str) -> Vec<f64> {
        let Some(col) = self.column(metric) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter(|((a, _), _)| a == algorithm)
            .map(|(_, row)| row[col])
            .collect()
    }

    /// Mean of a metric over an algorithm's rows; `None` when there are no rows.
    pub fn mean(&self, algorithm: &str, metric: &str) -> Option<f64> {
        let vals = self.values(algorithm, metric);
        if vals.is_empty() {
            return None;
        }
        Some(vals.iter().sum::<f64>() / vals.len() as f64)
    }

    /// `algorithm -> metric -> mean`.
    pub fn summary(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        let mut out = BTreeMap::new();
        for a in self.algorithms() {
            let per: BTreeMap<String, f64> = self
                .metrics
                .iter()
                .filter_map(|m| self.mean(&a, m).map(|v| (m.clone(), v)))
                .collect();
            out.insert(a, per);
        }
        out
    }

    /// Add a `default`-valued row for every `(algorithm, user)` pair missing from the
    /// table. Existing rows are untouched. Returns the number of rows added.
    pub fn fill_missing<'a, I>(&mut self, algorithms: I, population: &Population, default: f64) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let width = self.metrics.len();
        let mut added = 0;
        for a in algorithms {
            for u in population.iter() {
                self.rows
                    .entry((a.to_string(), u.to_string()))
                    .or_insert_with(|| {
                        added += 1;
                        vec![default; width]
                    });
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
