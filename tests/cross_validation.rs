//! The log-domain engine against direct per-user summation.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rankfair::{
    group_sizes, relevant_events, GroupKey, MeanCurve, Patience, ParameterGrid, Population,
    RecList, RecListAnalysis, Rbp, Truth, UncertainRbp,
};

const ITEMS: usize = 12;

fn item(i: usize) -> String {
    format!("i{i}")
}

/// Per user: a permutation prefix of the items and a relevant subset (at most 5).
fn user_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    (
        Just((0..ITEMS).collect::<Vec<_>>()).prop_shuffle(),
        1usize..=ITEMS,
        proptest::collection::btree_set(0..ITEMS, 0..=5),
    )
        .prop_map(|(perm, len, rel)| (perm[..len].to_vec(), rel.into_iter().collect()))
}

fn build(users: &[(Vec<usize>, Vec<usize>)]) -> (Vec<RecList>, Truth, Population) {
    let mut recs = Vec::new();
    let mut truth = Truth::new();
    for (u, (list, rel)) in users.iter().enumerate() {
        let user = format!("u{u}");
        recs.push(RecList::from_ordered("algo", user.as_str(), list.iter().map(|&i| item(i))));
        truth.insert_user(user.as_str());
        for &i in rel {
            truth.insert(user.as_str(), item(i), None);
        }
    }
    let population = Population::from_truth(&truth);
    (recs, truth, population)
}

/// `(1 - p) * sum p^(r-1)` over relevant ranks, averaged over users.
fn direct_mean(users: &[(Vec<usize>, Vec<usize>)], p: f64) -> f64 {
    let total: f64 = users
        .iter()
        .map(|(list, rel)| {
            list.iter()
                .enumerate()
                .filter(|(_, i)| rel.contains(i))
                .map(|(pos, _)| p.powi(pos as i32))
                .sum::<f64>()
                * (1.0 - p)
        })
        .sum();
    total / users.len() as f64
}

fn rel_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1e-12)
}

proptest! {
    #[test]
    fn engine_matches_direct_summation(
        users in proptest::collection::vec(user_strategy(), 3),
    ) {
        let (recs, truth, population) = build(&users);
        let grid = ParameterGrid::from_points(&[0.05, 0.3, 0.5, 0.8, 0.95], 0.2).unwrap();
        let curves = UncertainRbp::new(grid.clone())
            .by_algorithm(&recs, &truth, &population, None)
            .unwrap();
        let values = curves.get(&GroupKey::algorithm("algo")).unwrap().values().unwrap();
        for (v, p) in values.iter().zip(grid.points()) {
            let want = direct_mean(&users, p.get());
            prop_assert!(rel_close(*v, want), "p={} engine={} direct={}", p.get(), v, want);
        }
    }

    #[test]
    fn engine_matches_analyzer_at_each_point(
        users in proptest::collection::vec(user_strategy(), 3),
        p in 0.01f64..0.99,
    ) {
        let (recs, truth, population) = build(&users);
        let patience = Patience::new(p).unwrap();
        let mut analysis = RecListAnalysis::new();
        analysis.add_metric(Rbp::new(patience), None).unwrap();
        let table = analysis.compute_including_missing(&recs, &truth, &population).unwrap();
        let from_table = table.mean("algo", "rbp").unwrap();

        let curves = UncertainRbp::new(ParameterGrid::single(p).unwrap())
            .by_algorithm(&recs, &truth, &population, None)
            .unwrap();
        let v = curves.get(&GroupKey::algorithm("algo")).unwrap().values().unwrap()[0];
        prop_assert!(rel_close(v, from_table), "engine={} analyzer={}", v, from_table);
    }

    #[test]
    fn strata_partition_the_algorithm_mean(
        users in proptest::collection::vec(user_strategy(), 4),
    ) {
        let (recs, truth, population) = build(&users);
        let grid = ParameterGrid::from_points(&[0.2, 0.7], 0.5).unwrap();
        let engine = UncertainRbp::new(grid);

        // Even-numbered users form one stratum, odd-numbered the other.
        let key = |algo: &str, user: &str| {
            let n: usize = user.trim_start_matches('u').parse().ok()?;
            Some(GroupKey::stratum(algo, "parity", if n % 2 == 0 { "even" } else { "odd" }))
        };
        let events = relevant_events(&recs, &truth, None, key);
        let sizes = group_sizes(["algo"], &population, key);
        let strata = engine.compute(&events, &sizes).unwrap();
        let whole = engine.by_algorithm(&recs, &truth, &population, None).unwrap();

        let whole = whole.get(&GroupKey::algorithm("algo")).unwrap().values().unwrap();
        let mut combined = vec![0.0; whole.len()];
        let mut counted = 0usize;
        for (g, curve) in strata.iter() {
            let n = sizes[g];
            counted += n;
            let MeanCurve::Defined(vals) = curve else {
                return Err(TestCaseError::fail(format!("{g:?} undefined")));
            };
            for (c, v) in combined.iter_mut().zip(vals) {
                *c += v * n as f64;
            }
        }
        prop_assert_eq!(counted, population.len());
        for (c, w) in combined.iter().zip(whole) {
            prop_assert!(rel_close(c / counted as f64, *w));
        }
    }
}

#[test]
fn deep_ranks_do_not_underflow() {
    // A single relevant item at rank 2000: p^1999 underflows at p = 0.6 and is tiny
    // but representable at p = 0.999.
    let list = RecList::from_ordered("algo", "u0", (0..2000).map(item));
    let mut truth = Truth::new();
    truth.insert("u0", item(1999), None);
    let population = Population::from_truth(&truth);
    let grid = ParameterGrid::from_points(&[0.6, 0.999], 0.001).unwrap();
    let curves = UncertainRbp::new(grid)
        .by_algorithm(&[list], &truth, &population, None)
        .unwrap();
    let vals = curves.get(&GroupKey::algorithm("algo")).unwrap().values().unwrap();
    assert!(vals.iter().all(|v| v.is_finite() && *v >= 0.0));
    let want = 0.001 * 0.999f64.powi(1999);
    assert!(rel_close(vals[1], want));
}

#[test]
fn group_sizes_count_every_population_user() {
    let population = Population::new(["a", "b", "c"]);
    let sizes: BTreeMap<GroupKey, usize> =
        group_sizes(["x", "y"], &population, |algo, _| Some(GroupKey::algorithm(algo)));
    assert_eq!(sizes[&GroupKey::algorithm("x")], 3);
    assert_eq!(sizes[&GroupKey::algorithm("y")], 3);
}
