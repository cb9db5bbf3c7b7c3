//! Dynamic-programming expected precision, with incremental update mode.

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;

use crate::consecutive::ConsecutivePairRankEngine;
use crate::context::ExecutionContext;
use crate::error::{RankdistError, Result};
use crate::numeric::{is_probability, log1m_exp, log_add_exp, log_sum_exp, LOG_ZERO};
use crate::pairwise::{PairwiseRankEngine, ScoreTuple};
use crate::precision::{enumerate_precision, CalculateMode, DEFAULT_MAX_ENUMERATION_REALIZATIONS};
use crate::rank::{log_probability_of_beating, RankDistribution, ScoreComparisonRankDist};
use crate::universe::Universe;

/// Hit distribution of one candidate list.
#[derive(Debug, Clone, Serialize)]
pub struct PrecisionResult {
    /// `ln P(|A ∩ top-k| = i)` for `i = 0..=k`.
    pub hit_log_probability: Vec<f64>,
    /// `ln sum_i (i / k) P(hits = i)`
    pub log_expected_precision: f64,
}

impl PrecisionResult {
    /// Assemble from hit log-probabilities `1..=k`; entry 0 is overwritten
    /// with the complement of the rest.
    pub(crate) fn from_hits(mut hit_log_probability: Vec<f64>, ctx: &ExecutionContext) -> Self {
        let k = hit_log_probability.len().saturating_sub(1);
        let covered = log_sum_exp(hit_log_probability.iter().skip(1).copied());
        if !is_probability(covered.exp()) {
            ctx.report_degenerate("hit probabilities exceed 1");
        }
        hit_log_probability[0] = log1m_exp(covered);
        if hit_log_probability[0].is_nan() {
            ctx.report_degenerate("hit probability complement");
        }
        let log_expected_precision = if k == 0 {
            LOG_ZERO
        } else {
            log_sum_exp(
                hit_log_probability
                    .iter()
                    .enumerate()
                    .skip(1)
                    .map(|(i, lp)| lp + (i as f64 / k as f64).ln()),
            )
        };
        Self {
            hit_log_probability,
            log_expected_precision,
        }
    }

    pub fn k(&self) -> usize {
        self.hit_log_probability.len().saturating_sub(1)
    }

    pub fn expected_precision(&self) -> f64 {
        self.log_expected_precision.exp()
    }

    pub fn hit_probabilities(&self) -> Vec<f64> {
        self.hit_log_probability.iter().map(|lp| lp.exp()).collect()
    }
}

/// Expected precision averaged over every prefix of a candidate list.
#[derive(Debug, Clone, Serialize)]
pub struct MeanPrecisionResult {
    pub log_mean_expected_precision: f64,
    /// One entry per prefix length `1..=k`.
    pub log_expected_precisions: Vec<f64>,
    /// Hit distributions per prefix length `1..=k`.
    pub hit_log_probabilities: Vec<Vec<f64>>,
}

impl MeanPrecisionResult {
    pub fn mean_expected_precision(&self) -> f64 {
        self.log_mean_expected_precision.exp()
    }
}

/// Computes `EP@k` for candidate lists drawn from one universe.
///
/// ```text
/// P(hits = k)     = sum_{i,s} P_A(rank_i = k | s) * P(s beats every item outside A)
/// P(hits = i + 1) = sum_{(m,n,s_m,s_n)} P_A(m at i+1, n at i+2)
///                       * P(s_m within top k-i, s_n beyond it | outside A)
/// P(hits = 0)     = 1 - sum of the above
/// ```
///
/// Ties are broken pairwise with probability 0.5, as in
/// [`ScoreComparisonRankDist`]. The DP therefore matches enumeration when at
/// most two items share a value in any realization. Three or more tied items
/// make the hit distribution approximate; when its mass exceeds 1 the run is
/// reported through [`ExecutionContext::report_degenerate`].
///
/// The pairwise table over the items outside `A` is kept after a DP run so a
/// following [`update_expected_precision`](Self::update_expected_precision)
/// on a strict subset of `A` only folds in the removed items.
pub struct ExpectedPrecisionCalculator {
    universe: Universe,
    candidates: Vec<usize>,
    pairwise: Option<PairwiseRankEngine>,
    max_enumeration_realizations: u64,
}

impl ExpectedPrecisionCalculator {
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            candidates: Vec::new(),
            pairwise: None,
            max_enumeration_realizations: DEFAULT_MAX_ENUMERATION_REALIZATIONS,
        }
    }

    /// Cap on `S^N` realizations for [`CalculateMode::Enumeration`].
    pub fn with_max_enumeration_realizations(mut self, limit: u64) -> Self {
        self.max_enumeration_realizations = limit;
        self
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Candidate list of the last DP run (empty before the first one).
    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }

    /// Full computation for `candidates` (`k = candidates.len()`).
    ///
    /// Enumeration runs leave the update-mode state untouched.
    pub fn calculate_expected_precision(
        &mut self,
        candidates: &[usize],
        mode: CalculateMode,
        ctx: &ExecutionContext,
    ) -> Result<PrecisionResult> {
        validate_candidates(&self.universe, candidates)?;
        match mode {
            CalculateMode::Enumeration => enumerate_precision(
                &self.universe,
                candidates,
                self.max_enumeration_realizations,
                ctx,
            ),
            CalculateMode::Dp => self.run_dp(candidates, None, ctx),
        }
    }

    /// Recompute for a strict subset of the previous DP candidate list,
    /// reusing the retained pairwise state.
    ///
    /// # Errors
    ///
    /// `UpdateMode` before any DP run, or when `candidates` is not a strict
    /// subset of the previous list.
    pub fn update_expected_precision(
        &mut self,
        candidates: &[usize],
        ctx: &ExecutionContext,
    ) -> Result<PrecisionResult> {
        validate_candidates(&self.universe, candidates)?;
        if self.pairwise.is_none() || self.candidates.is_empty() {
            return Err(RankdistError::UpdateMode(
                "update mode can be used only after an initial run".to_string(),
            ));
        }
        let previous: HashSet<usize> = self.candidates.iter().copied().collect();
        if let Some(stranger) = candidates.iter().find(|c| !previous.contains(c)) {
            return Err(RankdistError::UpdateMode(format!(
                "candidate {} was not part of the previous candidate list",
                stranger
            )));
        }
        let kept: HashSet<usize> = candidates.iter().copied().collect();
        let removed: Vec<usize> = self
            .candidates
            .iter()
            .copied()
            .filter(|c| !kept.contains(c))
            .collect();
        if removed.is_empty() {
            return Err(RankdistError::UpdateMode(
                "candidates in update mode must be a strict subset of the previous list".to_string(),
            ));
        }
        self.run_dp(candidates, Some(&removed), ctx)
    }

    /// Mean of `EP@j` over the prefixes `candidates[..j]`, `j = 1..=k`.
    ///
    /// The full list is computed once; shorter prefixes go through update mode.
    pub fn calculate_mean_expected_precision(
        &mut self,
        candidates: &[usize],
        mode: CalculateMode,
        ctx: &ExecutionContext,
    ) -> Result<MeanPrecisionResult> {
        if mode == CalculateMode::Enumeration {
            return Err(RankdistError::UnsupportedMode(
                "mean expected precision is not available in enumeration mode".to_string(),
            ));
        }
        let k = candidates.len();
        log::info!("Beginning mean EP calculation over {} prefixes", k);

        let full = self.calculate_expected_precision(candidates, mode, ctx)?;
        let mut log_expected_precisions = vec![LOG_ZERO; k];
        let mut hit_log_probabilities = vec![Vec::new(); k];
        log_expected_precisions[k - 1] = full.log_expected_precision;
        hit_log_probabilities[k - 1] = full.hit_log_probability;

        for length in (1..k).rev() {
            log::info!("Computing precision for {} candidates", length);
            let result = self.update_expected_precision(&candidates[..length], ctx)?;
            log_expected_precisions[length - 1] = result.log_expected_precision;
            hit_log_probabilities[length - 1] = result.hit_log_probability;
        }

        let log_mean_expected_precision =
            log_sum_exp(log_expected_precisions.iter().copied()) - (k as f64).ln();
        log::info!(
            "Calculated expected precisions. Log of mean EP={:.5}. Mean EP={}",
            log_mean_expected_precision,
            log_mean_expected_precision.exp()
        );
        Ok(MeanPrecisionResult {
            log_mean_expected_precision,
            log_expected_precisions,
            hit_log_probabilities,
        })
    }

    fn run_dp(
        &mut self,
        candidates: &[usize],
        removed: Option<&[usize]>,
        ctx: &ExecutionContext,
    ) -> Result<PrecisionResult> {
        let total_start = Instant::now();
        let k = candidates.len();
        let candidate_universe = self.universe.select(candidates)?;
        let background = self.universe.select(&self.universe.complement(candidates))?;

        let mut hits = vec![LOG_ZERO; k + 1];
        // Nothing outside the list: every candidate is in the top k.
        hits[k] = if background.is_empty() {
            0.0
        } else {
            precision_at_k(&candidate_universe, &background, ctx)?
        };
        log::info!(
            "Log P@K={:.5}. P@K={}. Calculated in {:?}",
            hits[k],
            hits[k].exp(),
            total_start.elapsed()
        );

        let consecutive_start = Instant::now();
        let consecutive = ConsecutivePairRankEngine::new(&candidate_universe);
        let consecutive_ranks = consecutive.calculate_consecutive_rank(ctx)?;
        log::info!(
            "Calculated consecutive probabilities for candidate set in {:?}",
            consecutive_start.elapsed()
        );

        let pairwise_start = Instant::now();
        let mut seen = HashSet::new();
        let tuples: Vec<ScoreTuple> = consecutive_ranks
            .keys()
            .map(|key| consecutive.score_tuple(key))
            .filter(|tuple| seen.insert(tuple.key()))
            .collect();
        let engine = match removed {
            Some(removed) => {
                let mut engine = self.pairwise.take().ok_or_else(|| {
                    RankdistError::UpdateMode("no retained pairwise state".to_string())
                })?;
                for &j in removed {
                    engine.update_result(self.universe.probabilities(j), self.universe.values(j), ctx)?;
                }
                let added = engine.extend_tuples(&tuples, &background, ctx)?;
                log::info!(
                    "Updated pairwise rank probabilities for {} tuples ({} new) in {:?}",
                    tuples.len(),
                    added,
                    pairwise_start.elapsed()
                );
                engine
            }
            None => {
                let mut engine = PairwiseRankEngine::new(tuples, k)?;
                engine.calculate_pairwise_rank(&background, ctx)?;
                log::info!(
                    "Calculated pairwise rank probabilities for {} tuples in {:?}",
                    engine.tuples().len(),
                    pairwise_start.elapsed()
                );
                engine
            }
        };

        let compose_start = Instant::now();
        for (key, vector) in &consecutive_ranks {
            let tuple = consecutive.score_tuple(key);
            let t = engine.position(&tuple).ok_or_else(|| {
                RankdistError::InvalidInput(format!(
                    "pairwise table is missing tuple ({}, {})",
                    tuple.upper, tuple.lower
                ))
            })?;
            for (i, log_p) in vector.iter().enumerate() {
                if *log_p == LOG_ZERO {
                    continue;
                }
                // Upper value within the first k-i overall places, lower beyond.
                let boundary = engine.boundary_log_probability(t, k - i, k - i);
                hits[i + 1] = log_add_exp(hits[i + 1], log_p + boundary);
            }
        }
        log::info!("Calculated precisions in {:?}", compose_start.elapsed());

        self.pairwise = Some(engine);
        self.candidates = candidates.to_vec();

        let result = PrecisionResult::from_hits(hits, ctx);
        log::info!(
            "Done in {:?}. Log of expected precision: {:.5}. EP: {}",
            total_start.elapsed(),
            result.log_expected_precision,
            result.expected_precision()
        );
        log::debug!("Log hit probabilities: {:?}", result.hit_log_probability);
        Ok(result)
    }
}

/// `ln P(hits = k)`: some candidate sits at candidate-rank `k` and its value
/// beats every item outside the list.
fn precision_at_k(candidates: &Universe, background: &Universe, ctx: &ExecutionContext) -> Result<f64> {
    let k = candidates.len();
    let table = ScoreComparisonRankDist::new().rank_distribution(candidates, k, ctx)?;
    let grid = candidates.distinct_values();
    let beating = log_probability_of_beating(background, &grid, ctx);

    let mut log_precision = LOG_ZERO;
    for i in 0..k {
        for (slot, value) in candidates.values(i).iter().enumerate() {
            let g = grid.partition_point(|x| x < value);
            log_precision = log_add_exp(log_precision, table.get(i, k - 1, slot) + beating[g]);
        }
    }
    Ok(log_precision)
}

fn validate_candidates(universe: &Universe, candidates: &[usize]) -> Result<()> {
    if candidates.is_empty() {
        return Err(RankdistError::EmptyCandidates(
            "expected precision needs at least one candidate (k >= 1)".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(candidates.len());
    for &c in candidates {
        if c >= universe.len() {
            return Err(RankdistError::InvalidInput(format!(
                "candidate {} out of range for universe of {} items",
                c,
                universe.len()
            )));
        }
        if !seen.insert(c) {
            return Err(RankdistError::InvalidInput(format!("candidate {} listed twice", c)));
        }
    }
    Ok(())
}
