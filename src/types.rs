//! Input records: ranked lists, relevance judgments, catalog, population, group keys.
//!
//! All of these are built once from externally loaded tables and then only read.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Error, Result};

/// One recommended item at a 1-based rank.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedItem {
    pub item: String,
    pub rank: usize,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub score: Option<f64>,
}

impl RankedItem {
    pub fn new(item: impl Into<String>, rank: usize) -> Self {
        Self {
            item: item.into(),
            rank,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// The ranked output of one algorithm for one user.
///
/// Invariant: ranks are positive and unique; items are stored in ascending rank order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RecList {
    algorithm: String,
    user: String,
    items: Vec<RankedItem>,
}

impl RecList {
    /// Validate ranks and sort by rank.
    ///
    /// Zero or duplicate ranks are rejected rather than renumbered.
    pub fn new(
        algorithm: impl Into<String>,
        user: impl Into<String>,
        mut items: Vec<RankedItem>,
    ) -> Result<Self> {
        let algorithm = algorithm.into();
        let user = user.into();
        items.sort_by_key(|it| it.rank);
        for (i, it) in items.iter().enumerate() {
            if it.rank == 0 {
                return Err(Error::InvalidInput(format!(
                    "{algorithm}/{user}: item {} has non-positive rank",
                    it.item
                )));
            }
            if i > 0 && items[i - 1].rank == it.rank {
                return Err(Error::InvalidInput(format!(
                    "{algorithm}/{user}: rank {} assigned to both {} and {}",
                    it.rank,
                    items[i - 1].item,
                    it.item
                )));
            }
        }
        Ok(Self {
            algorithm,
            user,
            items,
        })
    }

    /// Build a list whose ranks follow iteration order (1, 2, 3, ...).
    pub fn from_ordered<I, S>(algorithm: impl Into<String>, user: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            algorithm: algorithm.into(),
            user: user.into(),
            items: items
                .into_iter()
                .enumerate()
                .map(|(i, s)| RankedItem::new(s, i + 1))
                .collect(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// All items in ascending rank order.
    pub fn items(&self) -> &[RankedItem] {
        &self.items
    }

    /// Items with `rank <= k` (everything when `k` is `None`).
    pub fn top(&self, k: Option<usize>) -> &[RankedItem] {
        match k {
            None => &self.items,
            Some(k) => {
                let end = self.items.partition_point(|it| it.rank <= k);
                &self.items[..end]
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Items a user considers relevant, with optional grades.
///
/// Items not present are non-relevant (not "unknown").
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelevanceSet {
    items: BTreeMap<String, f64>,
}

impl RelevanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary relevance: every listed item gets weight 1.
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(|s| (s.into(), 1.0)).collect(),
        }
    }

    pub fn insert(&mut self, item: impl Into<String>, weight: Option<f64>) {
        self.items.insert(item.into(), weight.unwrap_or(1.0));
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.contains_key(item)
    }

    /// Relevance grade; `None` for non-relevant items.
    pub fn weight(&self, item: &str) -> Option<f64> {
        self.items.get(item).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.items.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

/// Relevance judgments for every test user.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Truth {
    users: BTreeMap<String, RelevanceSet>,
}

impl Truth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(user, item, weight)` record.
    pub fn insert(&mut self, user: impl Into<String>, item: impl Into<String>, weight: Option<f64>) {
        self.users.entry(user.into()).or_default().insert(item, weight);
    }

    /// Register a user with an explicitly empty relevance set.
    pub fn insert_user(&mut self, user: impl Into<String>) {
        self.users.entry(user.into()).or_default();
    }

    pub fn get(&self, user: &str) -> Option<&RelevanceSet> {
        self.users.get(user)
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelevanceSet)> {
        self.users.iter().map(|(u, s)| (u.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl<U, I> FromIterator<(U, I)> for Truth
where
    U: Into<String>,
    I: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (U, I)>>(iter: T) -> Self {
        let mut t = Truth::new();
        for (u, i) in iter {
            t.insert(u, i, None);
        }
        t
    }
}

/// The authoritative item set. Order is first-observed and drives vector layout.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Catalog {
    items: Vec<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: BTreeMap<String, usize>,
}

impl Catalog {
    /// Build from item ids; duplicates are an input error.
    pub fn new<I, S>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Catalog::default();
        for s in items {
            let s = s.into();
            if out.index.contains_key(&s) {
                return Err(Error::InvalidInput(format!("catalog lists item {s} twice")));
            }
            out.index.insert(s.clone(), out.items.len());
            out.items.push(s);
        }
        Ok(out)
    }

    pub fn index_of(&self, item: &str) -> Option<usize> {
        self.index.get(item).copied()
    }

    /// Like [`Catalog::index_of`] but unknown items are an input error.
    pub fn require(&self, item: &str) -> Result<usize> {
        self.index_of(item)
            .ok_or_else(|| Error::InvalidInput(format!("item {item} is not in the catalog")))
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The full evaluation population: every user who should appear in per-user outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Population {
    users: BTreeSet<String>,
}

impl Population {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    /// Every user with a relevance entry (including empty ones).
    pub fn from_truth(truth: &Truth) -> Self {
        Self::new(truth.users())
    }

    pub fn contains(&self, user: &str) -> bool {
        self.users.contains(user)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Grouping key for per-group statistics.
///
/// A composite key is a tagged tuple, never a concatenated string, so
/// `("a_b", "c")` and `("a", "b_c")` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupKey {
    /// All users of one algorithm.
    Algorithm(String),
    /// Users of one algorithm sharing an attribute value (e.g. `gender = F`).
    Stratum {
        algorithm: String,
        attribute: String,
        value: String,
    },
}

impl GroupKey {
    pub fn algorithm(algorithm: impl Into<String>) -> Self {
        GroupKey::Algorithm(algorithm.into())
    }

    pub fn stratum(
        algorithm: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        GroupKey::Stratum {
            algorithm: algorithm.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn algorithm_name(&self) -> &str {
        match self {
            GroupKey::Algorithm(a) => a,
            GroupKey::Stratum { algorithm, .. } => algorithm,
        }
    }
}
