//! Ranking metrics for a top-k answer: precision, recall and DCG, plus
//! expected DCG of a list under score uncertainty.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::universe::Universe;

/// Precision against every relevant item.
/// Returns (relevant count in answer) / |answer|. An empty answer gives 0.0.
pub fn precision_at_k(answer: &[usize], relevant: &[usize]) -> f64 {
    let answer: HashSet<usize> = answer.iter().copied().collect();
    if answer.is_empty() {
        return 0.0;
    }
    let relevant: HashSet<usize> = relevant.iter().copied().collect();
    answer.intersection(&relevant).count() as f64 / answer.len() as f64
}

/// Precision against the `k` highest-graded items only.
///
/// `graded_groups` lists items grouped by grade, best grade first. Groups
/// are consumed until `k` items have been accounted for; a group that
/// straddles the boundary credits at most the remaining seats.
pub fn precision_k_ranked(answer: &[usize], graded_groups: &[Vec<usize>]) -> f64 {
    let answer: HashSet<usize> = answer.iter().copied().collect();
    let k = answer.len();
    if k == 0 {
        return 0.0;
    }
    let mut seats = k as i64;
    let mut common = 0usize;
    for group in graded_groups {
        if seats <= 0 {
            break;
        }
        let hits = group.iter().filter(|item| answer.contains(item)).count();
        common += hits.min(seats as usize);
        seats -= group.len() as i64;
    }
    common as f64 / k as f64
}

/// Recall: proportion of relevant items present in the answer.
/// If there are no relevant items (denominator 0), returns 0.0.
pub fn recall_at_k(answer: &[usize], relevant: &[usize]) -> f64 {
    let relevant: HashSet<usize> = relevant.iter().copied().collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let answer: HashSet<usize> = answer.iter().copied().collect();
    answer.intersection(&relevant).count() as f64 / relevant.len() as f64
}

/// How repeated items in an answer are credited by [`dcg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DcgVersion {
    /// Every position earns its item's gain.
    #[default]
    Liberal,
    /// An item earns its gain only at its first position.
    Conservative,
}

#[inline]
fn gain(grade: f64) -> f64 {
    grade.exp2() - 1.0
}

#[inline]
fn discount(rank: usize) -> f64 {
    ((rank + 2) as f64).log2()
}

/// `sum_r (2^grade - 1) / log2(r + 2)` over answer positions `r = 0..`.
/// Items without a grade earn nothing.
pub fn dcg(answer: &[usize], grades: &HashMap<usize, f64>, version: DcgVersion) -> f64 {
    let mut credited = HashSet::new();
    answer
        .iter()
        .enumerate()
        .map(|(rank, item)| {
            let first = credited.insert(*item);
            match grades.get(item) {
                Some(grade) if first || version == DcgVersion::Liberal => gain(*grade) / discount(rank),
                _ => 0.0,
            }
        })
        .sum()
}

/// DCG of the best possible answer of length `k`.
pub fn ideal_dcg(grades: &HashMap<usize, f64>, k: usize) -> f64 {
    let mut best: Vec<f64> = grades.values().copied().collect();
    best.sort_by(|a, b| b.total_cmp(a));
    best.iter()
        .take(k)
        .enumerate()
        .map(|(rank, grade)| gain(*grade) / discount(rank))
        .sum()
}

/// `sum_r E[2^S_i - 1] / log2(r + 2)` for the list `answer` of item indices.
pub fn expected_dcg(universe: &Universe, answer: &[usize]) -> f64 {
    answer
        .iter()
        .enumerate()
        .map(|(rank, &item)| {
            let expected_gain: f64 = universe
                .probabilities(item)
                .iter()
                .zip(universe.values(item))
                .map(|(p, v)| p * gain(*v))
                .sum();
            expected_gain / discount(rank)
        })
        .sum()
}
