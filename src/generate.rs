//! Seeded random universes for tests, benchmarks and the `random` command.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{RankdistError, Result};
use crate::universe::Universe;

/// Upper bound (exclusive) of generated score values.
pub const VALUE_RANGE: f64 = 100.0;

/// Uniform random probabilities (row-normalized) and values in
/// `[0, VALUE_RANGE)`. The same seed always yields the same universe.
pub fn uniform_universe(n_items: usize, n_scores: usize, seed: u64) -> Result<Universe> {
    let (probabilities, values) = uniform_rows(n_items, n_scores, seed)?;
    Universe::new(probabilities, values)
}

/// Uniform random probabilities over slot-index values `0..n_scores`, so
/// exact ties across items are the norm.
pub fn index_universe(n_items: usize, n_scores: usize, seed: u64) -> Result<Universe> {
    let (probabilities, _) = uniform_rows(n_items, n_scores, seed)?;
    Universe::from_probabilities(probabilities)
}

fn uniform_rows(n_items: usize, n_scores: usize, seed: u64) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
    if n_scores == 0 {
        return Err(RankdistError::InvalidInput(
            "generated universe needs at least one score slot".to_string(),
        ));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    // Strictly positive weights so every row has mass.
    let probabilities = (0..n_items)
        .map(|_| (0..n_scores).map(|_| rng.gen_range(f64::EPSILON..1.0)).collect())
        .collect();
    let values = (0..n_items)
        .map(|_| (0..n_scores).map(|_| rng.gen_range(0.0..VALUE_RANGE)).collect())
        .collect();
    Ok((probabilities, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_universe() {
        let a = uniform_universe(5, 3, 7).unwrap();
        let b = uniform_universe(5, 3, 7).unwrap();
        assert_eq!(a.probability_rows(), b.probability_rows());
        assert_eq!(a.value_rows(), b.value_rows());
        let c = uniform_universe(5, 3, 8).unwrap();
        assert_ne!(a.value_rows(), c.value_rows());
    }

    #[test]
    fn rows_are_normalized_and_in_range() {
        let u = uniform_universe(10, 4, 0).unwrap();
        for i in 0..u.len() {
            let total: f64 = u.probabilities(i).iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!(u.values(i).iter().all(|v| (0.0..VALUE_RANGE).contains(v)));
        }
    }

    #[test]
    fn index_universe_uses_slot_values() {
        let u = index_universe(3, 4, 1).unwrap();
        assert_eq!(u.values(2), &[0.0, 1.0, 2.0, 3.0]);
        assert!(index_universe(3, 0, 1).is_err());
    }
}
