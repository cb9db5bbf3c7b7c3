//! Tie-aware comparison of one item's score distribution against a threshold.

use super::logspace::is_probability;

/// How one item's probability mass splits around a threshold value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// P(score < threshold)
    pub lower: f64,
    /// P(score == threshold)
    pub equal: f64,
    /// P(score > threshold)
    pub higher: f64,
}

impl Comparison {
    /// P(score < threshold) + 0.5 P(score == threshold), clamped to `[0, 1]`:
    /// the chance the item ends up below the threshold under a random pairwise
    /// tie-break.
    pub fn lower_with_half_ties(&self) -> f64 {
        (self.lower + 0.5 * self.equal).clamp(0.0, 1.0)
    }

    /// False when [`lower_with_half_ties`](Self::lower_with_half_ties) had to
    /// clamp a value outside `[0, 1]`, or the split holds a NaN.
    pub fn is_in_range(&self) -> bool {
        is_probability(self.lower + 0.5 * self.equal)
    }
}

/// Sorted, merged score distribution of a single item, for O(log S) lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCdf {
    values: Vec<f64>,
    masses: Vec<f64>,
    /// `below[i]` = P(score < values[i])
    below: Vec<f64>,
}

impl ScoreCdf {
    /// Build from parallel probability / value slices. Slots sharing a value
    /// are merged.
    pub fn new(probabilities: &[f64], values: &[f64]) -> Self {
        let mut pairs: Vec<(f64, f64)> = values
            .iter()
            .copied()
            .zip(probabilities.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged_values: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut masses: Vec<f64> = Vec::with_capacity(pairs.len());
        for (value, mass) in pairs {
            match merged_values.last() {
                Some(last) if *last == value => {
                    if let Some(m) = masses.last_mut() {
                        *m += mass;
                    }
                }
                _ => {
                    merged_values.push(value);
                    masses.push(mass);
                }
            }
        }

        let mut below = Vec::with_capacity(masses.len());
        let mut running = 0.0;
        for mass in &masses {
            below.push(running);
            running += mass;
        }

        Self {
            values: merged_values,
            masses,
            below,
        }
    }

    pub fn split(&self, threshold: f64) -> Comparison {
        let idx = self.values.partition_point(|v| *v < threshold);
        let lower = if idx < self.below.len() {
            self.below[idx]
        } else {
            self.masses.iter().sum()
        };
        let equal = match self.values.get(idx) {
            Some(v) if *v == threshold => self.masses[idx],
            _ => 0.0,
        };
        let higher = (1.0 - lower - equal).clamp(0.0, 1.0);
        Comparison {
            lower: lower.clamp(0.0, 1.0),
            equal: equal.clamp(0.0, 1.0),
            higher,
        }
    }

    /// Distinct values in ascending order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_strict_and_equal() {
        let cdf = ScoreCdf::new(&[0.2, 0.3, 0.5], &[1.0, 2.0, 3.0]);
        let c = cdf.split(2.0);
        assert!((c.lower - 0.2).abs() < 1e-12);
        assert!((c.equal - 0.3).abs() < 1e-12);
        assert!((c.higher - 0.5).abs() < 1e-12);
        assert!((c.lower_with_half_ties() - 0.35).abs() < 1e-12);
        assert!(c.is_in_range());
    }

    #[test]
    fn out_of_range_split_is_flagged() {
        let c = Comparison {
            lower: 0.9,
            equal: 0.4,
            higher: 0.0,
        };
        assert_eq!(c.lower_with_half_ties(), 1.0);
        assert!(!c.is_in_range());
    }

    #[test]
    fn split_between_and_outside_support() {
        let cdf = ScoreCdf::new(&[0.2, 0.3, 0.5], &[1.0, 2.0, 3.0]);
        let mid = cdf.split(2.5);
        assert!((mid.lower - 0.5).abs() < 1e-12);
        assert_eq!(mid.equal, 0.0);
        let top = cdf.split(10.0);
        assert!((top.lower - 1.0).abs() < 1e-12);
        assert_eq!(top.higher, 0.0);
        let bottom = cdf.split(-1.0);
        assert_eq!(bottom.lower, 0.0);
        assert!((bottom.higher - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unsorted_and_duplicate_values_are_merged() {
        let cdf = ScoreCdf::new(&[0.1, 0.4, 0.5], &[7.0, 3.0, 7.0]);
        assert_eq!(cdf.values(), &[3.0, 7.0]);
        let c = cdf.split(7.0);
        assert!((c.lower - 0.4).abs() < 1e-12);
        assert!((c.equal - 0.6).abs() < 1e-12);
    }
}
