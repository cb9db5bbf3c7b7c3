//! Top-k answers chosen from a universe under score uncertainty.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::{RankdistError, Result};
use crate::numeric::{log_sum_exp, LogTable};
use crate::rank::{validate_window, RankDistribution};
use crate::universe::Universe;

/// Default relevance cut-off for [`TopKApproach::ProbabilityOfRelevance`].
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 4.0;

/// Ways to turn score distributions into a ranked answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopKApproach {
    /// Sort by `E[S]`.
    ExpectedScore,
    /// Sort by `P(S >= threshold)`.
    #[serde(rename = "probability_of_relevance_ranking")]
    ProbabilityOfRelevance,
    /// Items with the largest `P(rank <= k)`.
    GlobalTopK,
    /// For every rank, the item most likely to hold it (may repeat items).
    UKRanks,
}

impl TopKApproach {
    pub const ALL: [TopKApproach; 4] = [
        TopKApproach::ExpectedScore,
        TopKApproach::ProbabilityOfRelevance,
        TopKApproach::GlobalTopK,
        TopKApproach::UKRanks,
    ];
}

impl FromStr for TopKApproach {
    type Err = RankdistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "expected_score" => Ok(TopKApproach::ExpectedScore),
            "probability_of_relevance_ranking" => Ok(TopKApproach::ProbabilityOfRelevance),
            "global_top_k" => Ok(TopKApproach::GlobalTopK),
            "u_k_ranks" | "U-k-ranks" => Ok(TopKApproach::UKRanks),
            other => Err(RankdistError::Config(format!(
                "the approach '{}' for generating a top-k answer does not exist",
                other
            ))),
        }
    }
}

impl fmt::Display for TopKApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopKApproach::ExpectedScore => "expected_score",
            TopKApproach::ProbabilityOfRelevance => "probability_of_relevance_ranking",
            TopKApproach::GlobalTopK => "global_top_k",
            TopKApproach::UKRanks => "u_k_ranks",
        };
        write!(f, "{}", name)
    }
}

/// `E[S_i]` per item.
pub fn expected_scores(universe: &Universe) -> Vec<f64> {
    (0..universe.len())
        .map(|i| {
            universe
                .probabilities(i)
                .iter()
                .zip(universe.values(i))
                .map(|(p, v)| p * v)
                .sum()
        })
        .collect()
}

/// `P(S_i >= threshold)` per item.
pub fn relevance_probabilities(universe: &Universe, threshold: f64) -> Vec<f64> {
    (0..universe.len())
        .map(|i| {
            let c = universe.comparison(i, threshold);
            c.equal + c.higher
        })
        .collect()
}

/// `ln P(rank_i <= k)` per item from a `[N, k', S]` table (`k <= k'`).
pub fn log_top_k_probabilities(table: &LogTable, k: usize) -> Vec<f64> {
    let [n, window, n_scores] = table.shape();
    let k = k.min(window);
    (0..n)
        .map(|i| log_sum_exp(table.plane(i)[..k * n_scores].iter().copied()))
        .collect()
}

/// For each rank `r < k'`, the item with the largest `P(rank_i = r + 1)`.
pub fn most_likely_per_rank(table: &LogTable) -> Vec<usize> {
    let [n, window, n_scores] = table.shape();
    let per_item_rank: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let plane = table.plane(i);
            (0..window)
                .map(|r| log_sum_exp(plane[r * n_scores..(r + 1) * n_scores].iter().copied()))
                .collect()
        })
        .collect();
    (0..window)
        .map(|r| {
            let mut best = 0;
            for i in 1..n {
                if per_item_rank[i][r] > per_item_rank[best][r] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

/// Indices sorted by descending score; equal scores keep index order.
pub fn argsort_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
    order
}

/// Top-k answer for `approach`. Rank-based approaches build a window-`k`
/// table with `strategy`.
pub fn top_k_answer(
    approach: TopKApproach,
    universe: &Universe,
    k: usize,
    relevance_threshold: f64,
    strategy: &dyn RankDistribution,
    ctx: &ExecutionContext,
) -> Result<Vec<usize>> {
    validate_window(universe, k)?;
    let answer = match approach {
        TopKApproach::ExpectedScore => {
            let mut order = argsort_descending(&expected_scores(universe));
            order.truncate(k);
            order
        }
        TopKApproach::ProbabilityOfRelevance => {
            let mut order =
                argsort_descending(&relevance_probabilities(universe, relevance_threshold));
            order.truncate(k);
            order
        }
        TopKApproach::GlobalTopK => {
            let table = strategy.rank_distribution(universe, k, ctx)?;
            let mut order = argsort_descending(&log_top_k_probabilities(&table, k));
            order.truncate(k);
            order
        }
        TopKApproach::UKRanks => {
            let table = strategy.rank_distribution(universe, k, ctx)?;
            most_likely_per_rank(&table)
        }
    };
    log::debug!("Top-{} answer via {}: {:?}", k, approach, answer);
    Ok(answer)
}
