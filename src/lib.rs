pub mod config;
pub mod consecutive;
pub mod context;
pub mod error;
pub mod eval;
pub mod generate;
pub mod numeric;
pub mod pairwise;
pub mod precision;
pub mod rank;
pub mod topk;
pub mod universe;

pub use config::Config;
pub use consecutive::{ConsecutiveKey, ConsecutivePairRankEngine, ConsecutiveRanks};
pub use context::{Device, ExecutionContext};
pub use error::{RankdistError, Result};
pub use numeric::LogTable;
pub use pairwise::{PairwiseRankEngine, ScoreTuple};
pub use precision::{CalculateMode, ExpectedPrecisionCalculator, MeanPrecisionResult, PrecisionResult};
pub use rank::{ExactTieRankDist, RankDistribution, ScoreComparisonRankDist, TieBreaking};
pub use topk::TopKApproach;
pub use universe::Universe;
