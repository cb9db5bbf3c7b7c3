//! Serializable summaries of precision runs, as printed by the CLI.

use serde::Serialize;

use crate::context::ExecutionContext;
use crate::precision::{CalculateMode, MeanPrecisionResult, PrecisionResult};

/// One expected-precision run. Log values of zero probability serialize as
/// `null`.
#[derive(Debug, Clone, Serialize)]
pub struct PrecisionReport {
    pub mode: CalculateMode,
    pub k: usize,
    pub candidates: Vec<usize>,
    pub expected_precision: f64,
    pub log_expected_precision: f64,
    pub hit_probabilities: Vec<f64>,
    pub hit_log_probability: Vec<f64>,
    pub elapsed_ms: u128,
    pub degenerate_events: usize,
}

impl PrecisionReport {
    pub fn new(
        mode: CalculateMode,
        candidates: &[usize],
        result: &PrecisionResult,
        elapsed_ms: u128,
        ctx: &ExecutionContext,
    ) -> Self {
        Self {
            mode,
            k: result.k(),
            candidates: candidates.to_vec(),
            expected_precision: result.expected_precision(),
            log_expected_precision: result.log_expected_precision,
            hit_probabilities: result.hit_probabilities(),
            hit_log_probability: result.hit_log_probability.clone(),
            elapsed_ms,
            degenerate_events: ctx.degenerate_events(),
        }
    }
}

/// Mean expected precision over every prefix of a candidate list.
#[derive(Debug, Clone, Serialize)]
pub struct MeanPrecisionReport {
    pub candidates: Vec<usize>,
    pub mean_expected_precision: f64,
    pub log_mean_expected_precision: f64,
    /// `EP@j` for prefix lengths `j = 1..=k`.
    pub expected_precisions: Vec<f64>,
    pub elapsed_ms: u128,
    pub degenerate_events: usize,
}

impl MeanPrecisionReport {
    pub fn new(
        candidates: &[usize],
        result: &MeanPrecisionResult,
        elapsed_ms: u128,
        ctx: &ExecutionContext,
    ) -> Self {
        Self {
            candidates: candidates.to_vec(),
            mean_expected_precision: result.mean_expected_precision(),
            log_mean_expected_precision: result.log_mean_expected_precision,
            expected_precisions: result.log_expected_precisions.iter().map(|lp| lp.exp()).collect(),
            elapsed_ms,
            degenerate_events: ctx.degenerate_events(),
        }
    }
}
