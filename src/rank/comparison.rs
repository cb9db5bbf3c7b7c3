//! Rank distribution by direct score comparison with a random pairwise tie-break.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::numeric::{ln_clamped, log_add_exp, LogTable, LOG_ZERO};
use crate::rank::{canonical_order, validate_order, validate_window, RankDistribution};
use crate::universe::Universe;

/// Folds every other item into each item's `(rank, slot)` table one at a time.
///
/// For item `i` with value `v` in slot `l`, another item `j` lands below with
/// probability `p = P(S_j < v) + 0.5 P(S_j == v)`, otherwise it pushes `i` one
/// rank down:
///
/// ```text
/// new[r] = logaddexp(old[r] + ln p, old[r - 1] + ln(1 - p))
/// ```
///
/// The 0.5 split treats each tie pairwise, which is only exact when at most two
/// items can share a value. Callers needing exact multi-way ties use
/// [`ExactTieRankDist`](crate::rank::ExactTieRankDist).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreComparisonRankDist;

impl ScoreComparisonRankDist {
    pub fn new() -> Self {
        Self
    }

    /// Same as [`RankDistribution::rank_distribution`], folding other items in
    /// the given order (a permutation of `0..N`).
    pub fn rank_distribution_in_order(
        &self,
        universe: &Universe,
        k: usize,
        order: &[usize],
        ctx: &ExecutionContext,
    ) -> Result<LogTable> {
        validate_window(universe, k)?;
        validate_order(order, universe.len())?;

        let n_scores = universe.n_scores();
        let mut result = LogTable::zeros([universe.len(), k, n_scores]);
        let mut column = vec![LOG_ZERO; k];

        for i in 0..universe.len() {
            let own_probabilities = universe.probabilities(i);
            let own_values = universe.values(i);
            for slot in 0..n_scores {
                column.fill(LOG_ZERO);
                column[0] = own_probabilities[slot].ln();
                if column[0] == LOG_ZERO {
                    continue;
                }
                let value = own_values[slot];
                for &j in order {
                    if j == i {
                        continue;
                    }
                    let comparison = universe.comparison(j, value);
                    if !comparison.is_in_range() {
                        ctx.report_degenerate("score comparison");
                    }
                    let p_lower = comparison.lower_with_half_ties();
                    fold_item(&mut column, ln_clamped(p_lower), ln_clamped(1.0 - p_lower));
                }
                if column.iter().any(|v| v.is_nan()) {
                    ctx.report_degenerate("score-comparison rank distribution");
                }
                for (rank, log_p) in column.iter().enumerate() {
                    result.set(i, rank, slot, *log_p);
                }
            }
        }

        Ok(result)
    }
}

/// One fold-in step over a rank column, in place (descending so `r - 1` is
/// still the old value when `r` is updated).
#[inline]
fn fold_item(column: &mut [f64], ln_lower: f64, ln_upper: f64) {
    for rank in (1..column.len()).rev() {
        column[rank] = log_add_exp(column[rank] + ln_lower, column[rank - 1] + ln_upper);
    }
    column[0] += ln_lower;
}

impl RankDistribution for ScoreComparisonRankDist {
    fn name(&self) -> &'static str {
        "score_comparison"
    }

    fn rank_distribution(
        &self,
        universe: &Universe,
        k: usize,
        ctx: &ExecutionContext,
    ) -> Result<LogTable> {
        self.rank_distribution_in_order(universe, k, &canonical_order(universe), ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::log_sum_exp;

    fn literal_universe() -> Universe {
        Universe::new(
            vec![vec![0.4, 0.6], vec![0.3, 0.7], vec![0.2, 0.8]],
            vec![vec![5.0, 10.0], vec![2.0, 7.0], vec![3.0, 8.0]],
        )
        .unwrap()
    }

    #[test]
    fn ranks_by_value_not_marginal_probability() {
        let ctx = ExecutionContext::cpu();
        let table = ScoreComparisonRankDist::new()
            .rank_distribution(&literal_universe(), 2, &ctx)
            .unwrap();
        assert_eq!(table.shape(), [3, 2, 2]);
        let item0_top = table.get(0, 0, 1).exp();
        let item1_top = table.get(1, 0, 1).exp();
        // Value 10 beats everything: rank 1 whenever item 0 draws it.
        assert!((item0_top - 0.6).abs() < 1e-12);
        // Value 7 needs item 0 at 5 and item 2 at 3.
        assert!((item1_top - 0.7 * 0.4 * 0.2).abs() < 1e-12);
        assert!(item0_top > item1_top);
    }

    #[test]
    fn full_window_conserves_mass() {
        let ctx = ExecutionContext::cpu();
        let u = literal_universe();
        let table = ScoreComparisonRankDist::new().rank_distribution(&u, 3, &ctx).unwrap();
        for i in 0..u.len() {
            let total = log_sum_exp(table.plane(i).iter().copied()).exp();
            assert!((total - 1.0).abs() < 1e-9, "item {} mass {}", i, total);
        }
        assert!(!ctx.is_degenerate());
    }

    #[test]
    fn pairwise_tie_splits_evenly() {
        let ctx = ExecutionContext::cpu();
        let u = Universe::new(vec![vec![1.0], vec![1.0]], vec![vec![4.0], vec![4.0]]).unwrap();
        let table = ScoreComparisonRankDist::new().rank_distribution(&u, 2, &ctx).unwrap();
        assert!((table.get(0, 0, 0).exp() - 0.5).abs() < 1e-12);
        assert!((table.get(1, 1, 0).exp() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_probability_slot_stays_empty() {
        let ctx = ExecutionContext::cpu();
        let u = Universe::new(vec![vec![1.0, 0.0], vec![0.5, 0.5]], vec![vec![1.0, 9.0], vec![0.0, 2.0]])
            .unwrap();
        let table = ScoreComparisonRankDist::new().rank_distribution(&u, 2, &ctx).unwrap();
        assert_eq!(table.get(0, 0, 1), LOG_ZERO);
        assert_eq!(table.get(0, 1, 1), LOG_ZERO);
    }

    #[test]
    fn rejects_bad_window() {
        let ctx = ExecutionContext::cpu();
        let err = ScoreComparisonRankDist::new().rank_distribution(&literal_universe(), 0, &ctx);
        assert!(err.is_err());
    }
}
