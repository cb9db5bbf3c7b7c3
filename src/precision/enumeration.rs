//! Brute-force hit distribution over every realization of a universe.
//!
//! Visits all `S^N` joint slot choices. Items tied at the top-k cutoff are
//! admitted uniformly at random, so the overlap with the candidate list
//! follows a hypergeometric split of the tied group.

use std::collections::HashSet;
use std::time::Instant;

use crate::context::ExecutionContext;
use crate::error::{RankdistError, Result};
use crate::precision::PrecisionResult;
use crate::universe::Universe;

/// Hit distribution of `candidates` by enumeration.
///
/// # Errors
///
/// `UnsupportedMode` when `S^N` exceeds `max_realizations`.
pub fn enumerate_precision(
    universe: &Universe,
    candidates: &[usize],
    max_realizations: u64,
    ctx: &ExecutionContext,
) -> Result<PrecisionResult> {
    let n = universe.len();
    let s = universe.n_scores();
    let k = candidates.len();
    let realizations = u32::try_from(n)
        .ok()
        .and_then(|n| (s as u64).checked_pow(n))
        .filter(|count| *count <= max_realizations)
        .ok_or_else(|| {
            RankdistError::UnsupportedMode(format!(
                "enumeration over {}^{} realizations exceeds the limit of {}",
                s, n, max_realizations
            ))
        })?;
    if s == 0 {
        return Err(RankdistError::InvalidInput(
            "universe has no score slots to enumerate".to_string(),
        ));
    }

    let start = Instant::now();
    let in_list: HashSet<usize> = candidates.iter().copied().collect();
    let mut hits = vec![0.0f64; k + 1];
    let mut slots = vec![0usize; n];
    let mut realized = vec![0.0f64; n];
    let mut sorted = vec![0.0f64; n];

    for _ in 0..realizations {
        let mut probability = 1.0;
        for (j, &slot) in slots.iter().enumerate() {
            probability *= universe.probabilities(j)[slot];
            realized[j] = universe.values(j)[slot];
        }

        if probability > 0.0 {
            sorted.copy_from_slice(&realized);
            sorted.sort_by(|a, b| b.total_cmp(a));
            let cutoff = sorted[k - 1];

            let mut above = 0;
            let mut listed_above = 0;
            let mut tied = 0;
            let mut listed_tied = 0;
            for (j, &v) in realized.iter().enumerate() {
                let listed = in_list.contains(&j);
                if v > cutoff {
                    above += 1;
                    listed_above += usize::from(listed);
                } else if v == cutoff {
                    tied += 1;
                    listed_tied += usize::from(listed);
                }
            }

            let seats = k - above;
            for (x, weight) in hypergeometric(tied, listed_tied, seats) {
                hits[listed_above + x] += probability * weight;
            }
        }

        advance(&mut slots, s);
    }

    log::info!(
        "Enumerated {} realizations in {:?}",
        realizations,
        start.elapsed()
    );
    let hit_log_probability: Vec<f64> = hits.iter().map(|p| p.ln()).collect();
    Ok(PrecisionResult::from_hits(hit_log_probability, ctx))
}

/// Odometer step over `S^N` slot choices (last item fastest).
fn advance(slots: &mut [usize], n_scores: usize) {
    for slot in slots.iter_mut().rev() {
        *slot += 1;
        if *slot < n_scores {
            return;
        }
        *slot = 0;
    }
}

/// `(x, P(X = x))` for `x` listed items among `draws` taken without
/// replacement from `population` items of which `marked` are listed.
fn hypergeometric(population: usize, marked: usize, draws: usize) -> Vec<(usize, f64)> {
    let unmarked = population - marked;
    let low = draws.saturating_sub(unmarked);
    let high = draws.min(marked);
    let total = binomial(population, draws);
    (low..=high)
        .map(|x| (x, binomial(marked, x) * binomial(unmarked, draws - x) / total))
        .collect()
}

fn binomial(n: usize, r: usize) -> f64 {
    if r > n {
        return 0.0;
    }
    let r = r.min(n - r);
    (0..r).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odometer_visits_every_choice() {
        let mut slots = vec![0, 0];
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(slots.clone());
            advance(&mut slots, 3);
        }
        assert_eq!(seen[1], vec![0, 1]);
        assert_eq!(seen[3], vec![1, 0]);
        assert_eq!(seen[5], vec![1, 2]);
    }

    #[test]
    fn hypergeometric_weights() {
        let split = hypergeometric(4, 2, 2);
        let weights: Vec<f64> = split.iter().map(|(_, w)| *w).collect();
        assert_eq!(split.iter().map(|(x, _)| *x).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!((weights[0] - 1.0 / 6.0).abs() < 1e-12);
        assert!((weights[1] - 4.0 / 6.0).abs() < 1e-12);
        assert!((weights[2] - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn deterministic_universe() {
        let ctx = ExecutionContext::cpu();
        let u = Universe::new(
            vec![vec![1.0], vec![1.0], vec![1.0]],
            vec![vec![3.0], vec![2.0], vec![1.0]],
        )
        .unwrap();
        let result = enumerate_precision(&u, &[0, 2], 100, &ctx).unwrap();
        // Top-2 is always {0, 1}.
        assert!((result.hit_probabilities()[1] - 1.0).abs() < 1e-12);
        assert!((result.expected_precision() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn three_way_tie_at_cutoff() {
        let ctx = ExecutionContext::cpu();
        let u = Universe::new(vec![vec![1.0]; 3], vec![vec![5.0]; 3]).unwrap();
        let result = enumerate_precision(&u, &[0], 100, &ctx).unwrap();
        // One seat among three tied items.
        assert!((result.expected_precision() - 1.0 / 3.0).abs() < 1e-12);
        let result = enumerate_precision(&u, &[0, 1], 100, &ctx).unwrap();
        // Two seats: both listed (1/3) or one of them (2/3).
        let hits = result.hit_probabilities();
        assert!((hits[2] - 1.0 / 3.0).abs() < 1e-12);
        assert!((hits[1] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn refuses_oversized_enumeration() {
        let ctx = ExecutionContext::cpu();
        let u = Universe::from_probabilities(vec![vec![0.5, 0.5]; 5]).unwrap();
        let err = enumerate_precision(&u, &[0], 16, &ctx).unwrap_err();
        assert!(matches!(err, RankdistError::UnsupportedMode(_)));
        assert!(enumerate_precision(&u, &[0], 32, &ctx).is_ok());
    }
}
