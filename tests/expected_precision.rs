//! Expected precision: DP against the enumeration oracle, and update mode
//! against fresh computations.

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rankdist::generate;
use rankdist::{
    CalculateMode, ConsecutivePairRankEngine, ExecutionContext, ExpectedPrecisionCalculator,
    PairwiseRankEngine, PrecisionResult, RankdistError, Universe,
};

fn assert_results_close(a: &PrecisionResult, b: &PrecisionResult, tolerance: f64) {
    assert_eq!(a.k(), b.k());
    for (x, y) in a.hit_probabilities().iter().zip(b.hit_probabilities()) {
        assert!((x - y).abs() < tolerance, "hit probability {} vs {}", x, y);
    }
    assert!(
        (a.expected_precision() - b.expected_precision()).abs() < tolerance,
        "EP {} vs {}",
        a.expected_precision(),
        b.expected_precision()
    );
}

#[test]
fn test_literal_scenario_expected_precision() {
    let ctx = ExecutionContext::cpu();
    let universe = Universe::new(
        vec![vec![0.4, 0.6], vec![0.3, 0.7], vec![0.2, 0.8]],
        vec![vec![5.0, 10.0], vec![2.0, 7.0], vec![3.0, 8.0]],
    )
    .unwrap();
    let mut calculator = ExpectedPrecisionCalculator::new(universe);
    let dp = calculator
        .calculate_expected_precision(&[0, 2], CalculateMode::Dp, &ctx)
        .unwrap();
    let brute = calculator
        .calculate_expected_precision(&[0, 2], CalculateMode::Enumeration, &ctx)
        .unwrap();
    assert_results_close(&dp, &brute, 1e-4);
    // Item 1 makes the top 2 only when it draws 7 and one of the others is low.
    let item1_in = 0.7 * (1.0 - 0.6 * 0.8);
    assert!((dp.expected_precision() - (1.0 - item1_in / 2.0)).abs() < 1e-9);
}

#[test]
fn test_update_mode_walks_prefixes() {
    let ctx = ExecutionContext::cpu();
    let universe = generate::uniform_universe(9, 3, 42).unwrap();
    let candidates = [4, 0, 7, 2, 5];
    let mut calculator = ExpectedPrecisionCalculator::new(universe.clone());
    calculator
        .calculate_expected_precision(&candidates, CalculateMode::Dp, &ctx)
        .unwrap();
    for length in (1..candidates.len()).rev() {
        let updated = calculator
            .update_expected_precision(&candidates[..length], &ctx)
            .unwrap();
        let fresh = ExpectedPrecisionCalculator::new(universe.clone())
            .calculate_expected_precision(&candidates[..length], CalculateMode::Dp, &ctx)
            .unwrap();
        assert_results_close(&updated, &fresh, 1e-4);
    }
    assert!(!ctx.is_degenerate());
}

#[test]
fn test_update_mode_accepts_non_prefix_subset() {
    let ctx = ExecutionContext::cpu();
    let universe = generate::uniform_universe(7, 2, 3).unwrap();
    let mut calculator = ExpectedPrecisionCalculator::new(universe.clone());
    calculator
        .calculate_expected_precision(&[1, 3, 5, 6], CalculateMode::Dp, &ctx)
        .unwrap();
    let updated = calculator.update_expected_precision(&[6, 1], &ctx).unwrap();
    let fresh = ExpectedPrecisionCalculator::new(universe)
        .calculate_expected_precision(&[6, 1], CalculateMode::Dp, &ctx)
        .unwrap();
    assert_results_close(&updated, &fresh, 1e-4);
}

#[test]
fn test_errors_surface_as_typed_variants() {
    let ctx = ExecutionContext::cpu();
    let universe = generate::uniform_universe(4, 2, 0).unwrap();
    let mut calculator = ExpectedPrecisionCalculator::new(universe);
    assert!(matches!(
        calculator.calculate_expected_precision(&[], CalculateMode::Dp, &ctx),
        Err(RankdistError::EmptyCandidates(_))
    ));
    assert!(matches!(
        calculator.update_expected_precision(&[0], &ctx),
        Err(RankdistError::UpdateMode(_))
    ));
    assert!(matches!(
        calculator.calculate_mean_expected_precision(&[0, 1], CalculateMode::Enumeration, &ctx),
        Err(RankdistError::UnsupportedMode(_))
    ));
    let mut tight = ExpectedPrecisionCalculator::new(generate::uniform_universe(4, 2, 0).unwrap())
        .with_max_enumeration_realizations(8);
    assert!(matches!(
        tight.calculate_expected_precision(&[0], CalculateMode::Enumeration, &ctx),
        Err(RankdistError::UnsupportedMode(_))
    ));
}

#[test]
fn test_consecutive_and_pairwise_engines_compose() {
    // One candidate pair over a one-item background, checked by hand.
    let ctx = ExecutionContext::cpu();
    let candidates = Universe::new(vec![vec![1.0], vec![1.0]], vec![vec![6.0], vec![2.0]]).unwrap();
    let background = Universe::new(vec![vec![0.25, 0.75]], vec![vec![1.0, 4.0]]).unwrap();

    let consecutive = ConsecutivePairRankEngine::new(&candidates);
    let ranks = consecutive.calculate_consecutive_rank(&ctx).unwrap();
    assert_eq!(ranks.len(), 1);
    let (key, vector) = ranks.iter().next().unwrap();
    assert_eq!((key.upper_item, key.lower_item), (0, 1));
    assert!(vector[0].abs() < 1e-12);

    let tuple = consecutive.score_tuple(key);
    let mut pairwise = PairwiseRankEngine::new(vec![tuple], 2).unwrap();
    pairwise.calculate_pairwise_rank(&background, &ctx).unwrap();
    // 6 stays first; 2 drops to third overall when the background draws 4.
    let boundary = pairwise.boundary_log_probability(0, 2, 2).exp();
    assert!((boundary - 0.75).abs() < 1e-12);
}

/// Items 0 and 1 share the value grid `0, 10, 20, ..`; every other item is
/// offset by its index, so no realization has more than two tied items.
fn two_way_tie_universe(n_items: usize, n_scores: usize, seed: u64) -> Universe {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let probabilities = (0..n_items)
        .map(|_| (0..n_scores).map(|_| rng.gen_range(0.05..1.0)).collect())
        .collect();
    let values = (0..n_items)
        .map(|i| {
            let offset = if i < 2 { 0.0 } else { i as f64 };
            (0..n_scores).map(|s| 10.0 * s as f64 + offset).collect()
        })
        .collect();
    Universe::new(probabilities, values).unwrap()
}

#[test]
fn test_multi_way_ties_are_reported() {
    // Slot-index values tie across every item; the pairwise split overcounts.
    let ctx = ExecutionContext::cpu();
    let universe = generate::index_universe(4, 2, 0).unwrap();
    let result = ExpectedPrecisionCalculator::new(universe)
        .calculate_expected_precision(&[0, 1, 2], CalculateMode::Dp, &ctx)
        .unwrap();
    let covered: f64 = result.hit_probabilities()[1..].iter().sum();
    assert!(covered > 1.0, "hit mass {}", covered);
    assert_eq!(result.hit_log_probability[0], f64::NEG_INFINITY);
    assert!(ctx.is_degenerate());
}

#[test]
fn test_three_way_tie_diverges_from_enumeration() {
    // Three items with one shared value: the list [0] wins the single seat with
    // probability 1/3, while two independent coin flips give 1/4.
    let ctx = ExecutionContext::cpu();
    let universe = Universe::new(vec![vec![1.0]; 3], vec![vec![5.0]; 3]).unwrap();
    let mut calculator = ExpectedPrecisionCalculator::new(universe);
    let dp = calculator
        .calculate_expected_precision(&[0], CalculateMode::Dp, &ctx)
        .unwrap();
    let brute = calculator
        .calculate_expected_precision(&[0], CalculateMode::Enumeration, &ctx)
        .unwrap();
    assert!((dp.expected_precision() - 0.25).abs() < 1e-12);
    assert!((brute.expected_precision() - 1.0 / 3.0).abs() < 1e-12);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_dp_matches_enumeration_with_two_way_ties(
        n_items in 2usize..=4,
        n_scores in 1usize..=3,
        n_candidates in 1usize..=4,
        seed in any::<u64>(),
    ) {
        let ctx = ExecutionContext::cpu();
        let universe = two_way_tie_universe(n_items, n_scores, seed);
        let mut order: Vec<usize> = (0..n_items).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed.wrapping_add(7)));
        let candidates = &order[..n_candidates.min(n_items)];

        let mut calculator = ExpectedPrecisionCalculator::new(universe);
        let dp = calculator
            .calculate_expected_precision(candidates, CalculateMode::Dp, &ctx)
            .unwrap();
        let brute = calculator
            .calculate_expected_precision(candidates, CalculateMode::Enumeration, &ctx)
            .unwrap();
        for (x, y) in dp.hit_probabilities().iter().zip(brute.hit_probabilities()) {
            prop_assert!((x - y).abs() < 1e-6, "hit probability {} vs {}", x, y);
        }
        prop_assert!((dp.expected_precision() - brute.expected_precision()).abs() < 1e-6);
        prop_assert!(!ctx.is_degenerate());
    }

    #[test]
    fn prop_dp_matches_enumeration(
        n_items in 2usize..=4,
        n_scores in 1usize..=3,
        n_candidates in 1usize..=4,
        seed in any::<u64>(),
    ) {
        let ctx = ExecutionContext::cpu();
        let universe = generate::uniform_universe(n_items, n_scores, seed).unwrap();
        let mut order: Vec<usize> = (0..n_items).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)));
        let candidates = &order[..n_candidates.min(n_items)];

        let mut calculator = ExpectedPrecisionCalculator::new(universe);
        let dp = calculator
            .calculate_expected_precision(candidates, CalculateMode::Dp, &ctx)
            .unwrap();
        let brute = calculator
            .calculate_expected_precision(candidates, CalculateMode::Enumeration, &ctx)
            .unwrap();
        for (x, y) in dp.hit_probabilities().iter().zip(brute.hit_probabilities()) {
            prop_assert!((x - y).abs() < 1e-4, "hit probability {} vs {}", x, y);
        }
        prop_assert!((dp.expected_precision() - brute.expected_precision()).abs() < 1e-4);
    }
}
