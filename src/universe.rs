//! Validated, row-normalized universe of items with discrete score distributions.

use std::collections::HashSet;

use crate::error::{RankdistError, Result};
use crate::numeric::{Comparison, ScoreCdf};

/// Tolerance for a normalized row to count as summing to one.
const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Items `0..N-1`, each with `S` `(value, probability)` slots.
///
/// Probabilities are L1-normalized per row on construction. Values may repeat
/// within and across rows.
#[derive(Debug, Clone)]
pub struct Universe {
    n_scores: usize,
    probabilities: Vec<f64>,
    values: Vec<f64>,
    cdfs: Vec<ScoreCdf>,
}

impl Universe {
    /// Build from `score_probabilities[N][S]` and matching `score_values[N][S]`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for ragged rows, shape mismatch, negative or non-finite
    /// entries, or a row without probability mass.
    pub fn new(score_probabilities: Vec<Vec<f64>>, score_values: Vec<Vec<f64>>) -> Result<Self> {
        if score_probabilities.len() != score_values.len() {
            return Err(RankdistError::InvalidInput(format!(
                "score_probabilities has {} rows but score_values has {}",
                score_probabilities.len(),
                score_values.len()
            )));
        }
        let n_scores = score_probabilities.first().map(Vec::len).unwrap_or(0);
        let n_items = score_probabilities.len();

        let mut probabilities = Vec::with_capacity(n_items * n_scores);
        let mut values = Vec::with_capacity(n_items * n_scores);
        for (i, (p_row, v_row)) in score_probabilities
            .into_iter()
            .zip(score_values)
            .enumerate()
        {
            if p_row.len() != n_scores || v_row.len() != n_scores {
                return Err(RankdistError::InvalidInput(format!(
                    "row {} has {} probabilities and {} values, expected {}",
                    i,
                    p_row.len(),
                    v_row.len(),
                    n_scores
                )));
            }
            if let Some(bad) = v_row.iter().find(|v| !v.is_finite()) {
                return Err(RankdistError::InvalidInput(format!(
                    "row {} has non-finite score value {}",
                    i, bad
                )));
            }
            probabilities.extend(normalize_row(i, &p_row)?);
            values.extend(v_row);
        }

        let cdfs = (0..n_items)
            .map(|i| {
                let range = i * n_scores..(i + 1) * n_scores;
                ScoreCdf::new(&probabilities[range.clone()], &values[range])
            })
            .collect();

        Ok(Self {
            n_scores,
            probabilities,
            values,
            cdfs,
        })
    }

    /// Universe whose score values are the slot indices `0..S-1` for every item.
    pub fn from_probabilities(score_probabilities: Vec<Vec<f64>>) -> Result<Self> {
        let score_values = score_probabilities
            .iter()
            .map(|row| (0..row.len()).map(|s| s as f64).collect())
            .collect();
        Self::new(score_probabilities, score_values)
    }

    pub fn len(&self) -> usize {
        self.cdfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cdfs.is_empty()
    }

    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    /// Normalized probabilities of item `i`.
    pub fn probabilities(&self, i: usize) -> &[f64] {
        &self.probabilities[i * self.n_scores..(i + 1) * self.n_scores]
    }

    /// Score values of item `i`.
    pub fn values(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_scores..(i + 1) * self.n_scores]
    }

    /// Split of item `i`'s mass below / at / above `threshold`.
    pub fn comparison(&self, i: usize, threshold: f64) -> Comparison {
        self.cdfs[i].split(threshold)
    }

    /// Every distinct score value in the universe, ascending.
    pub fn distinct_values(&self) -> Vec<f64> {
        let mut all: Vec<f64> = self.values.clone();
        all.sort_by(|a, b| a.total_cmp(b));
        all.dedup_by(|a, b| a == b);
        all
    }

    /// Sub-universe with the given items, in the given order.
    pub fn select(&self, indices: &[usize]) -> Result<Universe> {
        let mut probabilities = Vec::with_capacity(indices.len() * self.n_scores);
        let mut values = Vec::with_capacity(indices.len() * self.n_scores);
        let mut cdfs = Vec::with_capacity(indices.len());
        for &i in indices {
            if i >= self.len() {
                return Err(RankdistError::InvalidInput(format!(
                    "item index {} out of range for universe of {} items",
                    i,
                    self.len()
                )));
            }
            probabilities.extend_from_slice(self.probabilities(i));
            values.extend_from_slice(self.values(i));
            cdfs.push(self.cdfs[i].clone());
        }
        Ok(Universe {
            n_scores: self.n_scores,
            probabilities,
            values,
            cdfs,
        })
    }

    /// Indices not in `indices`, ascending.
    pub fn complement(&self, indices: &[usize]) -> Vec<usize> {
        let taken: HashSet<usize> = indices.iter().copied().collect();
        (0..self.len()).filter(|i| !taken.contains(i)).collect()
    }

    /// Score probability matrix as nested rows (for reports and scenario files).
    pub fn probability_rows(&self) -> Vec<Vec<f64>> {
        (0..self.len()).map(|i| self.probabilities(i).to_vec()).collect()
    }

    /// Score value matrix as nested rows.
    pub fn value_rows(&self) -> Vec<Vec<f64>> {
        (0..self.len()).map(|i| self.values(i).to_vec()).collect()
    }
}

fn normalize_row(row_index: usize, row: &[f64]) -> Result<Vec<f64>> {
    if let Some(bad) = row.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(RankdistError::InvalidInput(format!(
            "row {} has invalid probability {}",
            row_index, bad
        )));
    }
    let total: f64 = row.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(RankdistError::InvalidInput(format!(
            "row {} has no probability mass to normalize (sum = {})",
            row_index, total
        )));
    }
    let normalized: Vec<f64> = row.iter().map(|p| p / total).collect();
    let check: f64 = normalized.iter().sum();
    if (check - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(RankdistError::InvalidInput(format!(
            "row {} sums to {} after normalization",
            row_index, check
        )));
    }
    Ok(normalized)
}
