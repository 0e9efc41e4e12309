//! Small hand-checked scenarios covering the whole evaluation path.

use rankfair::{
    discount, expected_exposure, fairness_summary, ideal_exposure, posterior, Catalog,
    GroupKey, MeanCurve, Patience, ParameterGrid, Population, RecList, RecListAnalysis,
    RelevanceSet, Truth, UncertainRbp, UniformPrior,
};

fn pat(p: f64) -> Patience {
    Patience::new(p).unwrap()
}

struct FourItems {
    catalog: Catalog,
    truth: Truth,
    population: Population,
    recs: Vec<RecList>,
}

/// Catalog {A,B,C,D}; U1 likes A, U2 likes B; each list puts the liked item first.
fn four_items() -> FourItems {
    let truth: Truth = [("U1", "A"), ("U2", "B")].into_iter().collect();
    FourItems {
        catalog: Catalog::new(["A", "B", "C", "D"]).unwrap(),
        population: Population::from_truth(&truth),
        truth,
        recs: vec![
            RecList::from_ordered("algo", "U1", ["A", "B", "C", "D"]),
            RecList::from_ordered("algo", "U2", ["B", "A", "C", "D"]),
        ],
    }
}

#[test]
fn four_item_discounts() {
    assert_eq!(discount(1, pat(0.5)).unwrap(), 1.0);
    assert!((discount(2, pat(0.5)).unwrap() - 0.5).abs() < 1e-15);
}

#[test]
fn four_item_mean_rbp_from_analyzer() {
    let s = four_items();
    let analysis = RecListAnalysis::standard(pat(0.5), None);
    let table = analysis.compute(&s.recs, &s.truth).unwrap();
    // mean_rbp(p) = (1 - p) * sum p^(rank-1) / n_users, and each user's only relevant
    // item sits at rank 1, so the mean is 0.5 at p = 0.5.
    // Undiscounted sum is 1 per user; the (1 - p) factor is applied once.
    assert!((table.get("algo", "U1", "rbp").unwrap() - 0.5).abs() < 1e-12);
    assert!((table.get("algo", "U2", "rbp").unwrap() - 0.5).abs() < 1e-12);
    assert!((table.mean("algo", "rbp").unwrap() - 0.5).abs() < 1e-12);
}

#[test]
fn four_item_mean_rbp_from_engine_matches_analyzer() {
    let s = four_items();
    let engine = UncertainRbp::new(ParameterGrid::single(0.5).unwrap());
    let curves = engine
        .by_algorithm(&s.recs, &s.truth, &s.population, None)
        .unwrap();
    // Same closed form through the log-domain path: (1 - 0.5) * (1 + 1) / 2.
    let curve = curves.get(&GroupKey::algorithm("algo")).unwrap();
    let v = curve.values().unwrap()[0];
    assert!((v - 0.5).abs() < 1e-12, "engine mean {v}");
}

#[test]
fn four_item_exposure_and_fairness() {
    let s = four_items();
    let p = pat(0.5);
    let exposure = expected_exposure("algo", &s.recs, &s.population, &s.catalog, p).unwrap();
    // A and B each get 1 + 0.5 over two users; C 0.25 each; D 0.125 each.
    let expected = [0.75, 0.75, 0.25, 0.125];
    for (got, want) in exposure.expected().iter().zip(expected) {
        assert!((got - want).abs() < 1e-12);
    }
    let total: f64 = exposure.values().iter().sum();
    assert!((total - 1.0).abs() < 1e-12);

    let target = ideal_exposure(&s.truth, &s.population, &s.catalog, p).unwrap();
    let total: f64 = target.values().iter().sum();
    assert!((total - 1.0).abs() < 1e-12);
    // Liked items get (1 - p^1) / 1 = 0.5 each on top of the uniform share.
    assert!(target.get("A").unwrap() > target.get("C").unwrap());
    assert_eq!(target.get("C"), target.get("D"));

    let summary = fairness_summary(&exposure, &target, 1e-9).unwrap();
    assert!(summary.gini > 0.0 && summary.gini < 1.0);
    assert!(summary.kl > 0.0);
    assert!(summary.l2 > 0.0);
}

#[test]
fn missing_users_score_zero_and_dilute_the_mean() {
    let mut s = four_items();
    s.truth.insert("U3", "C", None);
    let analysis = RecListAnalysis::standard(pat(0.5), None);
    let table = analysis
        .compute_including_missing(&s.recs, &s.truth, &Population::from_truth(&s.truth))
        .unwrap();
    assert_eq!(table.get("algo", "U3", "rbp"), Some(0.0));
    assert!((table.mean("algo", "rbp").unwrap() - 1.0 / 3.0).abs() < 1e-12);

    let without = analysis.compute(&s.recs, &s.truth).unwrap();
    assert_eq!(without.get("algo", "U3", "rbp"), None);
}

#[test]
fn empty_relevance_scores_zero() {
    let mut truth = Truth::new();
    truth.insert_user("U1");
    assert_eq!(truth.get("U1"), Some(&RelevanceSet::new()));
    let recs = [RecList::from_ordered("algo", "U1", ["A", "B"])];
    let table = RecListAnalysis::standard(pat(0.8), Some(10))
        .compute(&recs, &truth)
        .unwrap();
    for v in table.row("algo", "U1").unwrap() {
        assert_eq!(*v, 0.0);
    }
}

#[test]
fn posterior_over_scenario_is_monotone() {
    let s = four_items();
    let grid = ParameterGrid::with_resolution(200).unwrap();
    let engine = UncertainRbp::new(grid);
    let curves = engine
        .by_algorithm(&s.recs, &s.truth, &s.population, None)
        .unwrap();
    assert!(matches!(
        curves.get(&GroupKey::algorithm("algo")),
        Some(MeanCurve::Defined(_))
    ));

    let post = posterior(&curves, &UniformPrior).unwrap();
    let pc = post[&GroupKey::algorithm("algo")].as_ref().unwrap();
    let pts = pc.points();
    assert!(pts.windows(2).all(|w| w[0].cumulative <= w[1].cumulative));
    assert!(pts.windows(2).all(|w| w[0].value <= w[1].value));
    let prior_mass: f64 = pts.iter().map(|p| p.weight).sum();
    assert!((pc.total_weight() - prior_mass).abs() < 1e-9);
    // Uniform prior over 199 interior points of step 1/200.
    assert!((pc.total_weight() - 0.995).abs() < 1e-9);
    // Every user hits at rank 1, so RBP = 1 - p and its posterior mean is about 1/2.
    assert!((pc.mean().unwrap() - 0.5).abs() < 1e-3);
}
