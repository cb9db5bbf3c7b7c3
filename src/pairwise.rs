//! Joint rank distribution of two designated score values over a background.
//!
//! For a tuple `(upper, lower)` with `upper >= lower`, the table holds
//! `ln P(rank(upper) = r1 + 1, rank(lower) = r2 + 1)` for `r1 in 0..k` and
//! `r2 in 0..=k`. Column `k` is an overflow bucket meaning "ranked beyond k";
//! once mass lands there it stays. Mass starts at `(r1, r2) = (0, 1)`: the
//! upper value is one place ahead of the lower one.

use std::collections::HashMap;

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::{RankdistError, Result};
use crate::numeric::{is_probability, ln_clamped, log_add_exp, log_sum_exp, LogTable, LOG_ZERO};
use crate::universe::Universe;

/// Pair of score values whose joint rank is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreTuple {
    pub upper: f64,
    pub lower: f64,
}

impl ScoreTuple {
    pub fn new(upper: f64, lower: f64) -> Self {
        Self { upper, lower }
    }

    /// Bit-level key; `-0.0` and `0.0` map to the same key.
    pub(crate) fn key(&self) -> (u64, u64) {
        ((self.upper + 0.0).to_bits(), (self.lower + 0.0).to_bits())
    }
}

/// Where one background item's mass lands relative to a tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RelativePosition {
    below: f64,
    between: f64,
    above: f64,
}

fn relative_position(probabilities: &[f64], values: &[f64], tuple: &ScoreTuple) -> RelativePosition {
    let mut below = 0.0;
    let mut between = 0.0;
    let mut above = 0.0;
    for (&p, &x) in probabilities.iter().zip(values) {
        let lower_eq = x == tuple.lower;
        let upper_eq = x == tuple.upper;
        if lower_eq && upper_eq {
            below += p / 3.0;
            between += p / 3.0;
            above += p / 3.0;
            continue;
        }
        let half = |eq: bool| if eq { 0.5 } else { 0.0 };
        let strict = |cond: bool| if cond { 1.0 } else { 0.0 };
        below += p * (half(lower_eq) + strict(x < tuple.lower));
        between += p
            * (half(upper_eq) + strict(x < tuple.upper))
            * (half(lower_eq) + strict(x > tuple.lower));
        above += p * (half(upper_eq) + strict(x > tuple.upper));
    }
    RelativePosition {
        below,
        between,
        above,
    }
}

/// Joint rank tables for a batch of score tuples, with incremental fold-in.
///
/// The tables are mutated in place by [`update_result`](Self::update_result);
/// an engine is owned by exactly one caller (the precision calculator keeps
/// one across update-mode runs).
#[derive(Debug, Clone)]
pub struct PairwiseRankEngine {
    tuples: Vec<ScoreTuple>,
    positions: HashMap<(u64, u64), usize>,
    k: usize,
    result: LogTable,
}

impl PairwiseRankEngine {
    /// Engine for `tuples` with rank window `k`, tables at their initial state.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `k == 0`, a tuple has `upper < lower` or a
    /// non-finite value, or a tuple is repeated.
    pub fn new(tuples: Vec<ScoreTuple>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(RankdistError::InvalidInput(
                "pairwise rank window k must be at least 1".to_string(),
            ));
        }
        let mut positions = HashMap::with_capacity(tuples.len());
        for (t, tuple) in tuples.iter().enumerate() {
            validate_tuple(tuple)?;
            if positions.insert(tuple.key(), t).is_some() {
                return Err(RankdistError::InvalidInput(format!(
                    "duplicate score tuple ({}, {})",
                    tuple.upper, tuple.lower
                )));
            }
        }
        let result = initial_tables(tuples.len(), k);
        Ok(Self {
            tuples,
            positions,
            k,
            result,
        })
    }

    /// Reset the tables and fold in every item of `background`.
    pub fn calculate_pairwise_rank(
        &mut self,
        background: &Universe,
        ctx: &ExecutionContext,
    ) -> Result<&LogTable> {
        self.result = initial_tables(self.tuples.len(), self.k);
        for j in 0..background.len() {
            self.update_result(background.probabilities(j), background.values(j), ctx)?;
        }
        Ok(&self.result)
    }

    /// Fold exactly one more item into the current tables.
    pub fn update_result(
        &mut self,
        probabilities: &[f64],
        values: &[f64],
        ctx: &ExecutionContext,
    ) -> Result<()> {
        if probabilities.len() != values.len() {
            return Err(RankdistError::InvalidInput(format!(
                "item has {} probabilities but {} values",
                probabilities.len(),
                values.len()
            )));
        }

        let k = self.k;
        let cols = k + 1;
        let mut next = vec![LOG_ZERO; k * cols];
        let mut degenerate = false;

        for (t, tuple) in self.tuples.iter().enumerate() {
            let position = relative_position(probabilities, values, tuple);
            degenerate |= !(is_probability(position.below)
                && is_probability(position.between)
                && is_probability(position.above));
            let ln_below = ln_clamped(position.below);
            let ln_between = ln_clamped(position.between);
            let ln_above = ln_clamped(position.above);

            let old = self.result.plane(t);
            for r1 in 0..k {
                for r2 in 0..cols {
                    let mut v = old[r1 * cols + r2] + ln_below;
                    if r2 > 0 {
                        v = log_add_exp(v, old[r1 * cols + r2 - 1] + ln_between);
                        if r1 > 0 {
                            v = log_add_exp(v, old[(r1 - 1) * cols + r2 - 1] + ln_above);
                        }
                    }
                    if r2 == k {
                        // Overflow only accumulates.
                        v = log_add_exp(v, old[r1 * cols + k] + ln_between);
                        if r1 > 0 {
                            v = log_add_exp(v, old[(r1 - 1) * cols + k] + ln_above);
                        }
                    }
                    next[r1 * cols + r2] = v;
                }
            }
            degenerate |= next.iter().any(|v| v.is_nan());
            self.result.plane_mut(t).copy_from_slice(&next);
        }

        if degenerate {
            ctx.report_degenerate("pairwise rank update");
        }
        Ok(())
    }

    /// Add tuples the engine does not track yet, computed from scratch over
    /// `background`. Tuples already present are skipped.
    pub fn extend_tuples(
        &mut self,
        tuples: &[ScoreTuple],
        background: &Universe,
        ctx: &ExecutionContext,
    ) -> Result<usize> {
        let mut missing: Vec<ScoreTuple> = Vec::new();
        for tuple in tuples {
            if self.position(tuple).is_none() && !missing.iter().any(|m| m.key() == tuple.key()) {
                missing.push(*tuple);
            }
        }
        if missing.is_empty() {
            return Ok(0);
        }

        let mut extra = PairwiseRankEngine::new(missing, self.k)?;
        extra.calculate_pairwise_rank(background, ctx)?;
        let added = extra.tuples.len();
        for tuple in extra.tuples {
            self.positions.insert(tuple.key(), self.tuples.len());
            self.tuples.push(tuple);
        }
        self.result.append(extra.result)?;
        Ok(added)
    }

    /// Index of `tuple` in the result table.
    pub fn position(&self, tuple: &ScoreTuple) -> Option<usize> {
        self.positions.get(&tuple.key()).copied()
    }

    /// `ln P(r1 < upper_limit, r2 >= lower_from)` for tuple `t` (0-based
    /// table indices, overflow included).
    pub fn boundary_log_probability(&self, t: usize, upper_limit: usize, lower_from: usize) -> f64 {
        let cols = self.k + 1;
        let plane = self.result.plane(t);
        let upper_limit = upper_limit.min(self.k);
        log_sum_exp(
            (0..upper_limit)
                .flat_map(|r1| (lower_from.min(cols)..cols).map(move |r2| plane[r1 * cols + r2])),
        )
    }

    /// `[T, k, k + 1]` table.
    pub fn result(&self) -> &LogTable {
        &self.result
    }

    pub fn tuples(&self) -> &[ScoreTuple] {
        &self.tuples
    }
}

fn validate_tuple(tuple: &ScoreTuple) -> Result<()> {
    if !tuple.upper.is_finite() || !tuple.lower.is_finite() {
        return Err(RankdistError::InvalidInput(format!(
            "score tuple ({}, {}) is not finite",
            tuple.upper, tuple.lower
        )));
    }
    if tuple.upper < tuple.lower {
        return Err(RankdistError::InvalidInput(format!(
            "score tuple upper {} is below lower {}",
            tuple.upper, tuple.lower
        )));
    }
    Ok(())
}

fn initial_tables(n_tuples: usize, k: usize) -> LogTable {
    let mut table = LogTable::zeros([n_tuples, k, k + 1]);
    for t in 0..n_tuples {
        table.set(t, 0, 1, 0.0);
    }
    table
}
