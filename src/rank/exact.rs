//! Rank distribution with exact resolution of multi-way ties.
//!
//! State per item is a table over `(e, rank, column)` where `e` is how many
//! folded-in items drew exactly the column's value and `rank` is how many drew
//! strictly more. Folding item `j` in:
//!
//! - strictly lower: the plane is unchanged;
//! - equal: mass moves `e -> e + 1`;
//! - strictly higher: mass moves `rank -> rank + 1`.
//!
//! Once the whole universe is folded, an item tied with `e` others sits
//! uniformly at one of the `e + 1` positions starting at `rank`, so each
//! `e`-plane is divided by `e + 1` and spread over the following `e` ranks.

use crate::context::ExecutionContext;
use crate::error::{RankdistError, Result};
use crate::numeric::{ln_clamped, log_add_exp, LogTable, LOG_ZERO};
use crate::rank::{canonical_order, validate_order, validate_window, RankDistribution};
use crate::universe::Universe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Batching {
    OneByOne,
    /// `floor(sqrt(N))`, at least 1.
    Auto,
    Fixed(usize),
}

/// Exact multi-way tie strategy, one item at a time or in batches.
///
/// The batched form folds the universe *minus* a batch once, then finishes
/// each batch member by folding the rest of its batch. Both forms give the
/// same table up to float rounding.
#[derive(Debug, Clone, Copy)]
pub struct ExactTieRankDist {
    batching: Batching,
}

impl ExactTieRankDist {
    pub fn one_by_one() -> Self {
        Self {
            batching: Batching::OneByOne,
        }
    }

    pub fn batched(batch_size: usize) -> Self {
        Self {
            batching: Batching::Fixed(batch_size.max(1)),
        }
    }

    pub fn batched_auto() -> Self {
        Self {
            batching: Batching::Auto,
        }
    }

    /// One-by-one form folding other items in the given order.
    pub fn rank_distribution_in_order(
        &self,
        universe: &Universe,
        k: usize,
        order: &[usize],
        ctx: &ExecutionContext,
    ) -> Result<LogTable> {
        validate_window(universe, k)?;
        validate_order(order, universe.len())?;

        let n = universe.len();
        let n_scores = universe.n_scores();
        let mut result = LogTable::zeros([n, k, n_scores]);

        for i in 0..n {
            let own_values = universe.values(i);
            let seeds: Vec<f64> = universe.probabilities(i).iter().map(|p| p.ln()).collect();
            let mut table = TieTable::seeded(n, k, &seeds);
            for &j in order {
                if j == i {
                    continue;
                }
                table.fold(&log_splits(universe, j, own_values));
            }
            write_item(&mut result, i, &table.resolve(), ctx);
        }
        Ok(result)
    }

    fn rank_distribution_batched(
        &self,
        universe: &Universe,
        k: usize,
        batch_size: usize,
        ctx: &ExecutionContext,
    ) -> Result<LogTable> {
        validate_window(universe, k)?;
        if batch_size == 0 {
            return Err(RankdistError::InvalidInput(
                "batch size must be at least 1".to_string(),
            ));
        }

        let n = universe.len();
        let mut result = LogTable::zeros([n, k, universe.n_scores()]);

        for start in (0..n).step_by(batch_size) {
            let end = (start + batch_size).min(n);

            // Every value any batch member can take becomes a column of the
            // shared table.
            let mut grid: Vec<f64> = (start..end)
                .flat_map(|i| universe.values(i).iter().copied())
                .collect();
            grid.sort_by(|a, b| a.total_cmp(b));
            grid.dedup_by(|a, b| a == b);

            let mut base = TieTable::seeded(n, k, &vec![0.0; grid.len()]);
            for j in (0..start).chain(end..n) {
                base.fold(&log_splits(universe, j, &grid));
            }
            log::debug!(
                "Exact rank distribution: folded {} items outside batch {}..{} over {} columns",
                n - (end - start),
                start,
                end,
                grid.len()
            );

            for i in start..end {
                let own_values = universe.values(i);
                let columns: Vec<usize> = own_values
                    .iter()
                    .map(|v| grid.partition_point(|g| g < v))
                    .collect();
                let offsets: Vec<f64> = universe.probabilities(i).iter().map(|p| p.ln()).collect();
                let mut table = base.gather(&columns, &offsets);
                for j in start..end {
                    if j == i {
                        continue;
                    }
                    table.fold(&log_splits(universe, j, own_values));
                }
                write_item(&mut result, i, &table.resolve(), ctx);
            }
        }
        Ok(result)
    }
}

impl RankDistribution for ExactTieRankDist {
    fn name(&self) -> &'static str {
        match self.batching {
            Batching::OneByOne => "exact_tie_one_by_one",
            Batching::Auto | Batching::Fixed(_) => "exact_tie_batched",
        }
    }

    fn rank_distribution(
        &self,
        universe: &Universe,
        k: usize,
        ctx: &ExecutionContext,
    ) -> Result<LogTable> {
        match self.batching {
            Batching::OneByOne => {
                self.rank_distribution_in_order(universe, k, &canonical_order(universe), ctx)
            }
            Batching::Auto => {
                let batch_size = ((universe.len() as f64).sqrt().floor() as usize).max(1);
                self.rank_distribution_batched(universe, k, batch_size, ctx)
            }
            Batching::Fixed(batch_size) => {
                self.rank_distribution_batched(universe, k, batch_size, ctx)
            }
        }
    }
}

/// Log-probabilities that one item lands strictly below, equal to, or strictly
/// above a value.
#[derive(Debug, Clone, Copy)]
struct LogSplit {
    lower: f64,
    equal: f64,
    higher: f64,
}

fn log_splits(universe: &Universe, item: usize, thresholds: &[f64]) -> Vec<LogSplit> {
    thresholds
        .iter()
        .map(|v| {
            let c = universe.comparison(item, *v);
            LogSplit {
                lower: ln_clamped(c.lower),
                equal: ln_clamped(c.equal),
                higher: ln_clamped(c.higher),
            }
        })
        .collect()
}

fn write_item(result: &mut LogTable, item: usize, resolved: &[f64], ctx: &ExecutionContext) {
    if resolved.iter().any(|v| v.is_nan()) {
        ctx.report_degenerate("exact tie rank distribution");
    }
    result.plane_mut(item).copy_from_slice(resolved);
}

/// `(ties, rank, column)` log-probability state for one item (or a shared
/// batch base).
#[derive(Debug, Clone)]
struct TieTable {
    ties: usize,
    k: usize,
    cols: usize,
    /// Highest tie count that can hold mass so far.
    reached: usize,
    data: Vec<f64>,
}

impl TieTable {
    fn seeded(ties: usize, k: usize, seeds: &[f64]) -> Self {
        let cols = seeds.len();
        let mut data = vec![LOG_ZERO; ties.max(1) * k * cols];
        data[..cols].copy_from_slice(seeds);
        Self {
            ties: ties.max(1),
            k,
            cols,
            reached: 0,
            data,
        }
    }

    #[inline]
    fn idx(&self, e: usize, r: usize, c: usize) -> usize {
        (e * self.k + r) * self.cols + c
    }

    /// Fold one item in, in place. Iterating `e` and `rank` downwards keeps the
    /// `(e - 1, r)` and `(e, r - 1)` sources at their old values.
    fn fold(&mut self, splits: &[LogSplit]) {
        debug_assert_eq!(splits.len(), self.cols);
        let top = (self.reached + 1).min(self.ties - 1);
        let plane = self.k * self.cols;
        for e in (0..=top).rev() {
            for r in (0..self.k).rev() {
                for (c, split) in splits.iter().enumerate() {
                    let idx = self.idx(e, r, c);
                    let mut v = self.data[idx] + split.lower;
                    if e > 0 {
                        v = log_add_exp(v, self.data[idx - plane] + split.equal);
                    }
                    if r > 0 {
                        v = log_add_exp(v, self.data[idx - self.cols] + split.higher);
                    }
                    self.data[idx] = v;
                }
            }
        }
        self.reached = top;
    }

    /// Copy of the table restricted to `columns`, with `offsets[c]` added to
    /// the whole `c`-th column.
    fn gather(&self, columns: &[usize], offsets: &[f64]) -> TieTable {
        let cols = columns.len();
        let mut data = vec![LOG_ZERO; self.ties * self.k * cols];
        for e in 0..=self.reached {
            for r in 0..self.k {
                for (c, (&source, offset)) in columns.iter().zip(offsets).enumerate() {
                    data[(e * self.k + r) * cols + c] = self.data[self.idx(e, r, source)] + offset;
                }
            }
        }
        TieTable {
            ties: self.ties,
            k: self.k,
            cols,
            reached: self.reached,
            data,
        }
    }

    /// Spread every tie plane over its `e + 1` positions and collapse the tie
    /// axis. Returns a `(rank, column)` plane.
    fn resolve(&self) -> Vec<f64> {
        let mut out = vec![LOG_ZERO; self.k * self.cols];
        for e in 0..=self.reached {
            let ln_share = -((e + 1) as f64).ln();
            for c in 0..self.cols {
                if e + 1 >= self.k {
                    // Every tied position from `rank` on lies inside the window,
                    // so the spread is a running sum.
                    let mut acc = LOG_ZERO;
                    for r in 0..self.k {
                        acc = log_add_exp(acc, self.data[self.idx(e, r, c)] + ln_share);
                        let o = r * self.cols + c;
                        out[o] = log_add_exp(out[o], acc);
                    }
                } else {
                    for r in 0..self.k {
                        let mut window = LOG_ZERO;
                        for r0 in r.saturating_sub(e)..=r {
                            window = log_add_exp(window, self.data[self.idx(e, r0, c)]);
                        }
                        let o = r * self.cols + c;
                        out[o] = log_add_exp(out[o], window + ln_share);
                    }
                }
            }
        }
        out
    }
}
