//! Marginal rank distributions of every `(item, score slot)` within a universe.
//!
//! Two strategies implement [`RankDistribution`]:
//!
//! - [`ScoreComparisonRankDist`]: folds items in with a random pairwise
//!   tie-break (`P(lower) + 0.5 P(equal)`). Fast; approximate when three or more
//!   items can tie on one value.
//! - [`ExactTieRankDist`]: tracks the number of exactly tied items and resolves
//!   ties uniformly at the end. Exact under multi-way ties; has a batched form.
//!
//! Both return a `[N, k, S]` [`LogTable`] holding
//! `ln P(item i has slot l and rank r + 1)`.

pub mod beating;
pub mod comparison;
pub mod exact;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::context::ExecutionContext;
use crate::error::{RankdistError, Result};
use crate::numeric::LogTable;
use crate::universe::Universe;

pub use beating::log_probability_of_beating;
pub use comparison::ScoreComparisonRankDist;
pub use exact::ExactTieRankDist;

/// Capability: compute the rank distribution of every item's score slots.
pub trait RankDistribution {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// `[N, k, S]` table of `ln P(item i has slot l at rank r + 1)`.
    fn rank_distribution(
        &self,
        universe: &Universe,
        k: usize,
        ctx: &ExecutionContext,
    ) -> Result<LogTable>;
}

/// Which tie model to use when building a rank distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreaking {
    /// Random pairwise split of exact ties.
    #[default]
    Pairwise,
    /// Exact uniform resolution of multi-way ties.
    Exact,
}

impl TieBreaking {
    /// Boxed strategy for this tie model. `batch_size` only affects `Exact`;
    /// zero picks `floor(sqrt(N))` per call.
    pub fn strategy(self, batch_size: usize) -> Box<dyn RankDistribution> {
        match self {
            TieBreaking::Pairwise => Box::new(ScoreComparisonRankDist::new()),
            TieBreaking::Exact if batch_size == 0 => Box::new(ExactTieRankDist::batched_auto()),
            TieBreaking::Exact => Box::new(ExactTieRankDist::batched(batch_size)),
        }
    }
}

impl FromStr for TieBreaking {
    type Err = RankdistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pairwise" | "score_comparison" => Ok(TieBreaking::Pairwise),
            "exact" | "tie_breaking" => Ok(TieBreaking::Exact),
            other => Err(RankdistError::Config(format!(
                "unknown tie-breaking strategy '{}' (expected 'pairwise' or 'exact')",
                other
            ))),
        }
    }
}

impl fmt::Display for TieBreaking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreaking::Pairwise => write!(f, "pairwise"),
            TieBreaking::Exact => write!(f, "exact"),
        }
    }
}

/// Reject windows outside `1..=N`.
pub(crate) fn validate_window(universe: &Universe, k: usize) -> Result<()> {
    if k == 0 {
        return Err(RankdistError::InvalidInput(
            "rank window k must be at least 1".to_string(),
        ));
    }
    if k > universe.len() {
        return Err(RankdistError::InvalidInput(format!(
            "rank window k = {} exceeds universe size {}",
            k,
            universe.len()
        )));
    }
    Ok(())
}

/// Fold order shared by every item: indices sorted by score distribution.
///
/// Items with identical distributions end up adjacent, so dropping either one
/// leaves the same sequence of folds and their tables come out bitwise equal.
pub(crate) fn canonical_order(universe: &Universe) -> Vec<usize> {
    let mut order: Vec<usize> = (0..universe.len()).collect();
    order.sort_by(|&a, &b| {
        let by_values = universe.values(a).iter().zip(universe.values(b));
        let by_probabilities = universe.probabilities(a).iter().zip(universe.probabilities(b));
        by_values
            .chain(by_probabilities)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Reject fold orders that are not a permutation of `0..n`.
pub(crate) fn validate_order(order: &[usize], n: usize) -> Result<()> {
    let mut seen = vec![false; n];
    if order.len() != n {
        return Err(RankdistError::InvalidInput(format!(
            "fold order has {} entries for a universe of {} items",
            order.len(),
            n
        )));
    }
    for &j in order {
        if j >= n || seen[j] {
            return Err(RankdistError::InvalidInput(format!(
                "fold order is not a permutation (bad entry {})",
                j
            )));
        }
        seen[j] = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_groups_identical_items() {
        let u = Universe::new(
            vec![vec![0.3, 0.7], vec![0.5, 0.5], vec![0.3, 0.7], vec![0.9, 0.1]],
            vec![vec![1.0, 4.0], vec![0.5, 3.0], vec![1.0, 4.0], vec![1.0, 4.0]],
        )
        .unwrap();
        assert_eq!(canonical_order(&u), vec![1, 0, 2, 3]);
        let order = canonical_order(&u);
        assert!(validate_order(&order, u.len()).is_ok());
    }

    #[test]
    fn tie_breaking_parse() {
        assert_eq!("pairwise".parse::<TieBreaking>().unwrap(), TieBreaking::Pairwise);
        assert_eq!("EXACT".parse::<TieBreaking>().unwrap(), TieBreaking::Exact);
        assert!(matches!(
            "bogus".parse::<TieBreaking>(),
            Err(RankdistError::Config(_))
        ));
    }

    #[test]
    fn strategy_names() {
        assert_eq!(TieBreaking::Pairwise.strategy(0).name(), "score_comparison");
        assert_eq!(TieBreaking::Exact.strategy(4).name(), "exact_tie_batched");
    }

    #[test]
    fn window_bounds() {
        let u = Universe::from_probabilities(vec![vec![1.0], vec![1.0]]).unwrap();
        assert!(validate_window(&u, 0).is_err());
        assert!(validate_window(&u, 1).is_ok());
        assert!(validate_window(&u, 2).is_ok());
        assert!(validate_window(&u, 3).is_err());
    }

    #[test]
    fn order_must_be_permutation() {
        assert!(validate_order(&[2, 0, 1], 3).is_ok());
        assert!(validate_order(&[0, 0, 1], 3).is_err());
        assert!(validate_order(&[0, 1], 3).is_err());
        assert!(validate_order(&[0, 1, 3], 3).is_err());
    }
}
