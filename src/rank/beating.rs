//! Probability that a score value outranks every item of a background universe.

use crate::context::ExecutionContext;
use crate::numeric::ln_clamped;
use crate::universe::Universe;

/// For each value, `sum_j ln(P(S_j < v) + 0.5 P(S_j == v))` over the
/// background: the log-probability that `v` would sit above every background
/// item under a random pairwise tie-break. An empty background gives `0.0`
/// (certainty) for every value.
pub fn log_probability_of_beating(
    background: &Universe,
    values: &[f64],
    ctx: &ExecutionContext,
) -> Vec<f64> {
    values
        .iter()
        .map(|v| {
            (0..background.len())
                .map(|j| {
                    let comparison = background.comparison(j, *v);
                    if !comparison.is_in_range() {
                        ctx.report_degenerate("probability of beating");
                    }
                    ln_clamped(comparison.lower_with_half_ties())
                })
                .sum::<f64>()
        })
        .collect()
}
