//! Expected Precision@k of a candidate list under score uncertainty.

pub mod calculator;
pub mod enumeration;
pub mod report;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RankdistError, Result};

pub use calculator::{ExpectedPrecisionCalculator, MeanPrecisionResult, PrecisionResult};
pub use enumeration::enumerate_precision;
pub use report::{MeanPrecisionReport, PrecisionReport};

/// Default cap on `S^N` realizations the enumeration oracle will visit.
pub const DEFAULT_MAX_ENUMERATION_REALIZATIONS: u64 = 1_000_000;

/// How expected precision is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculateMode {
    /// Dynamic programming over rank, consecutive-pair and pairwise tables.
    #[default]
    Dp,
    /// Brute force over every realization of the universe.
    Enumeration,
}

impl FromStr for CalculateMode {
    type Err = RankdistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dp" => Ok(CalculateMode::Dp),
            "enumeration" => Ok(CalculateMode::Enumeration),
            other => Err(RankdistError::Config(format!(
                "unknown precision mode '{}' (expected 'dp' or 'enumeration')",
                other
            ))),
        }
    }
}

impl fmt::Display for CalculateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculateMode::Dp => write!(f, "dp"),
            CalculateMode::Enumeration => write!(f, "enumeration"),
        }
    }
}
