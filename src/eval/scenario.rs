//! Scenario files: a universe plus optional candidate list and ground truth.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RankdistError, Result};
use crate::universe::Universe;

/// JSON scenario as read by the CLI.
///
/// ```json
/// {
///   "score_probabilities": [[0.4, 0.6], [0.3, 0.7]],
///   "score_values": [[5, 10], [2, 7]],
///   "candidates": [1],
///   "grades": {"0": 5.0, "1": 3.0}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub score_probabilities: Vec<Vec<f64>>,
    /// Missing values mean slot indices `0..S`.
    #[serde(default)]
    pub score_values: Option<Vec<Vec<f64>>>,
    /// Candidate list for precision runs.
    #[serde(default)]
    pub candidates: Option<Vec<usize>>,
    /// Rank window for rank-distribution and top-k runs.
    #[serde(default)]
    pub k: Option<usize>,
    /// Observed grade per item, for evaluating answers against ground truth.
    #[serde(default)]
    pub grades: Option<HashMap<usize, f64>>,
}

impl Scenario {
    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&text)?;
        Ok(scenario)
    }

    /// Scenario around an existing universe (used by the generator).
    pub fn from_universe(universe: &Universe) -> Self {
        Self {
            score_probabilities: universe.probability_rows(),
            score_values: Some(universe.value_rows()),
            candidates: None,
            k: None,
            grades: None,
        }
    }

    /// Validated universe.
    pub fn universe(&self) -> Result<Universe> {
        match &self.score_values {
            Some(values) => Universe::new(self.score_probabilities.clone(), values.clone()),
            None => Universe::from_probabilities(self.score_probabilities.clone()),
        }
    }

    /// Candidate list, or an error naming the missing field.
    pub fn require_candidates(&self) -> Result<&[usize]> {
        self.candidates.as_deref().ok_or_else(|| {
            RankdistError::InvalidInput("scenario has no \"candidates\" list".to_string())
        })
    }

    /// Items graded at or above `threshold`, ascending.
    pub fn relevant_items(&self, threshold: f64) -> Vec<usize> {
        let mut items: Vec<usize> = self
            .grades
            .iter()
            .flatten()
            .filter(|(_, grade)| **grade >= threshold)
            .map(|(item, _)| *item)
            .collect();
        items.sort_unstable();
        items
    }

    /// Graded items grouped by equal grade, best grade first.
    pub fn graded_groups(&self) -> Vec<Vec<usize>> {
        let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (item, grade) in self.grades.iter().flatten() {
            groups.entry(order_key(*grade)).or_default().push(*item);
        }
        groups
            .into_values()
            .rev()
            .map(|mut group| {
                group.sort_unstable();
                group
            })
            .collect()
    }
}

/// Monotone map from `f64` to `u64` so grades can key an ordered map.
fn order_key(x: f64) -> u64 {
    let bits = x.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    }
}
