//! Probability that two designated `(item, score)` instances occupy adjacent
//! ranks within a (candidate) universe.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::numeric::{ln_clamped, log_add_exp, LOG_ZERO};
use crate::pairwise::ScoreTuple;
use crate::universe::Universe;

/// `(m, n, s_m, s_n)`: item `m` in slot `upper_slot` directly ahead of item
/// `n` in slot `lower_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConsecutiveKey {
    pub upper_item: usize,
    pub lower_item: usize,
    pub upper_slot: usize,
    pub lower_slot: usize,
}

/// For each key, `ln P(m at rank i + 1 with s_m, n at rank i + 2 with s_n)`
/// for `i = 0..N-2`. Keys with zero probability everywhere are absent.
pub type ConsecutiveRanks = BTreeMap<ConsecutiveKey, Vec<f64>>;

/// Adjacent-rank engine over one universe.
///
/// Precomputes, for every item `j` and every distinct value `s` of the
/// universe, `p_lower[j, s] = P(S_j < s) + 0.5 P(S_j == s)` (clamped to 1).
pub struct ConsecutivePairRankEngine<'a> {
    universe: &'a Universe,
    grid: Vec<f64>,
    /// `ln p_lower[j, g]`, row-major by item.
    ln_lower: Vec<f64>,
    /// `ln(1 - p_lower[j, g])`
    ln_upper: Vec<f64>,
    /// Some `p_lower` had to be clamped into `[0, 1]`.
    clamped: bool,
}

impl<'a> ConsecutivePairRankEngine<'a> {
    pub fn new(universe: &'a Universe) -> Self {
        let grid = universe.distinct_values();
        let mut ln_lower = Vec::with_capacity(universe.len() * grid.len());
        let mut ln_upper = Vec::with_capacity(universe.len() * grid.len());
        let mut clamped = false;
        for j in 0..universe.len() {
            for &s in &grid {
                let comparison = universe.comparison(j, s);
                clamped |= !comparison.is_in_range();
                let p = comparison.lower_with_half_ties();
                ln_lower.push(ln_clamped(p));
                ln_upper.push(ln_clamped(1.0 - p));
            }
        }
        Self {
            universe,
            grid,
            ln_lower,
            ln_upper,
            clamped,
        }
    }

    #[inline]
    fn grid_index(&self, value: f64) -> usize {
        self.grid.partition_point(|g| *g < value)
    }

    /// Score values behind a key, as a tuple for the pairwise engine.
    pub fn score_tuple(&self, key: &ConsecutiveKey) -> ScoreTuple {
        ScoreTuple::new(
            self.universe.values(key.upper_item)[key.upper_slot],
            self.universe.values(key.lower_item)[key.lower_slot],
        )
    }

    /// Every ordered pair of distinct items and every slot pair with
    /// `s_n <= s_m`, folded against the remaining items.
    pub fn calculate_consecutive_rank(&self, ctx: &ExecutionContext) -> Result<ConsecutiveRanks> {
        if self.clamped {
            ctx.report_degenerate("consecutive pair comparison");
        }
        let n = self.universe.len();
        let mut results = ConsecutiveRanks::new();
        if n < 2 {
            return Ok(results);
        }
        let g = self.grid.len();
        let mut vector = vec![LOG_ZERO; n - 1];

        for m in 0..n {
            for other in 0..n {
                if other == m {
                    continue;
                }
                let m_probs = self.universe.probabilities(m);
                let m_values = self.universe.values(m);
                let n_probs = self.universe.probabilities(other);
                let n_values = self.universe.values(other);

                for (upper_slot, (&s_m, &p_m)) in m_values.iter().zip(m_probs).enumerate() {
                    for (lower_slot, (&s_n, &p_n)) in n_values.iter().zip(n_probs).enumerate() {
                        if s_n > s_m {
                            continue;
                        }
                        let mut seed = p_m * p_n;
                        if s_n == s_m {
                            // Random tie-break between the pair itself.
                            seed /= 2.0;
                        }
                        if seed <= 0.0 {
                            continue;
                        }

                        let gm = self.grid_index(s_m);
                        let gn = self.grid_index(s_n);
                        vector.fill(LOG_ZERO);
                        vector[0] = seed.ln();
                        for l in 0..n {
                            if l == m || l == other {
                                continue;
                            }
                            let stay = self.ln_lower[l * g + gn];
                            let push = self.ln_upper[l * g + gm];
                            for r in (1..vector.len()).rev() {
                                vector[r] = log_add_exp(vector[r] + stay, vector[r - 1] + push);
                            }
                            vector[0] += stay;
                        }

                        if vector.iter().any(|v| v.is_nan()) {
                            ctx.report_degenerate("consecutive pair rank");
                        }
                        if vector.iter().any(|v| *v > LOG_ZERO) {
                            results.insert(
                                ConsecutiveKey {
                                    upper_item: m,
                                    lower_item: other,
                                    upper_slot,
                                    lower_slot,
                                },
                                vector.clone(),
                            );
                        }
                    }
                }
            }
        }

        log::debug!(
            "Consecutive pair ranks: {} non-zero keys over {} items",
            results.len(),
            n
        );
        Ok(results)
    }
}
