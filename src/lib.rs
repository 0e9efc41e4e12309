//! `rankfair`: offline evaluation of recommender rankings under an uncertain
//! user patience, plus exposure-fairness statistics.
//!
//! Inputs are ranked lists ([`RecList`]), relevance judgments ([`Truth`]), the item
//! [`Catalog`] and the evaluation [`Population`]. Everything is computed in one
//! deterministic pass; nothing is stored between calls.
//!
//! **Per-list metrics:**
//! - [`RecListAnalysis`]: registry of [`ListMetric`]s (RBP, nDCG, reciprocal rank,
//!   hit, precision, recall) producing a [`MetricTable`] per `(algorithm, user)`.
//!   [`RecListAnalysis::compute_including_missing`] outer-joins against the population
//!   so users without a list score 0.
//!
//! **Uncertain patience:**
//! - [`UncertainRbp`]: mean RBP of every group at every point of a [`ParameterGrid`],
//!   reduced in log space (`logp::log_sum_exp_iter`) so deep ranks never underflow to zero.
//! - [`posterior`]: reweights each curve by a prior ([`UniformPrior`], [`BetaPrior`],
//!   or any `Fn(f64) -> f64`) into a [`PosteriorCurve`] with mean, CDF, quantiles and
//!   credible intervals.
//!
//! **Exposure fairness:**
//! - [`expected_exposure`]: population-mean attention per catalog item, normalized.
//! - [`ideal_exposure`]: the target an ideal ranker would produce.
//! - [`gini`], [`kl_divergence`], [`l2_loss`], combined by [`fairness_summary`].
//!
//! **Conventions:**
//! - Patience `p` lives in the open interval `(0, 1)` ([`Patience`]); `p = 1` makes
//!   RBP degenerate and `p = 0` makes the log domain undefined.
//! - Ranks are 1-based; the attention at rank `r` is `p^(r-1)`.
//! - Maps are `BTreeMap`s so every output iterates in a stable order.
//! - Undefined statistics are reported as [`Error::Undefined`] or
//!   [`MeanCurve::Undefined`], never as `NaN`.
//!
//! ```
//! use rankfair::{ParameterGrid, Population, RecList, Truth, UncertainRbp};
//!
//! let recs = vec![
//!     RecList::from_ordered("als", "u1", ["A", "B"]),
//!     RecList::from_ordered("als", "u2", ["A", "B"]),
//! ];
//! let truth: Truth = [("u1", "A"), ("u2", "B")].into_iter().collect();
//! let population = Population::from_truth(&truth);
//!
//! let engine = UncertainRbp::new(ParameterGrid::single(0.5)?);
//! let curves = engine.by_algorithm(&recs, &truth, &population, None)?;
//! let mean = curves.iter().next().and_then(|(_, c)| c.values()).map(|v| v[0]);
//! // (1 + 0.5) * (1 - 0.5) / 2 users
//! assert!((mean.unwrap() - 0.375).abs() < 1e-12);
//! # Ok::<(), rankfair::Error>(())
//! ```
//!
//! **Features:**
//! - `stochastic` (default): seeded Monte Carlo draws from priors and posteriors.
//! - `serde`: `Serialize`/`Deserialize` on configs and results.

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod discount;
pub use discount::*;

mod types;
pub use types::*;

mod config;
pub use config::*;

mod analysis;
pub use analysis::*;

mod exposure;
pub use exposure::*;

mod fairness;
pub use fairness::*;

mod grid;
pub use grid::*;

mod uncertain;
pub use uncertain::*;

mod posterior;
pub use posterior::*;
