//! Dense three-axis table of log-probabilities, row-major.

use serde::Serialize;

use crate::error::{RankdistError, Result};
use crate::numeric::logspace::LOG_ZERO;

/// Log-probability table addressed by `(outer, row, column)`, e.g.
/// `(item, rank, score slot)` or `(tuple, upper rank, lower rank)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogTable {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl LogTable {
    /// Table of the given shape with every entry at probability zero.
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self::filled(shape, LOG_ZERO)
    }

    pub fn filled(shape: [usize; 3], value: f64) -> Self {
        Self {
            shape,
            data: vec![value; shape[0] * shape[1] * shape[2]],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    fn offset(&self, a: usize, b: usize, c: usize) -> usize {
        debug_assert!(a < self.shape[0] && b < self.shape[1] && c < self.shape[2]);
        (a * self.shape[1] + b) * self.shape[2] + c
    }

    #[inline]
    pub fn get(&self, a: usize, b: usize, c: usize) -> f64 {
        self.data[self.offset(a, b, c)]
    }

    #[inline]
    pub fn set(&mut self, a: usize, b: usize, c: usize, value: f64) {
        let idx = self.offset(a, b, c);
        self.data[idx] = value;
    }

    fn plane_len(&self) -> usize {
        self.shape[1] * self.shape[2]
    }

    /// The `(row, column)` plane for one outer index.
    pub fn plane(&self, a: usize) -> &[f64] {
        let len = self.plane_len();
        &self.data[a * len..(a + 1) * len]
    }

    pub fn plane_mut(&mut self, a: usize) -> &mut [f64] {
        let len = self.plane_len();
        &mut self.data[a * len..(a + 1) * len]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }

    /// Append the planes of `other` along the outer axis.
    pub fn append(&mut self, other: LogTable) -> Result<()> {
        if self.shape[1] != other.shape[1] || self.shape[2] != other.shape[2] {
            return Err(RankdistError::InvalidInput(format!(
                "cannot append table of shape {:?} to {:?}",
                other.shape, self.shape
            )));
        }
        self.shape[0] += other.shape[0];
        self.data.extend(other.data);
        Ok(())
    }

    /// Largest absolute difference between two tables of equal shape, where
    /// two `-inf` entries count as equal. `None` when shapes differ.
    pub fn max_abs_diff(&self, other: &LogTable) -> Option<f64> {
        if self.shape != other.shape {
            return None;
        }
        let diff = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| {
                if a == b {
                    0.0
                } else {
                    (a - b).abs()
                }
            })
            .fold(0.0, f64::max);
        Some(diff)
    }

    /// Entries converted back to plain probabilities.
    pub fn probabilities(&self) -> Vec<f64> {
        self.data.iter().map(|v| v.exp()).collect()
    }
}
