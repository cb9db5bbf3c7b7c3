//! Evaluation of top-k answers: scenario files and ranking metrics (P@K, R@K, DCG).

pub mod metrics;
pub mod scenario;

pub use metrics::{
    dcg, expected_dcg, ideal_dcg, precision_at_k, precision_k_ranked,
    recall_at_k, DcgVersion,
};
pub use scenario::Scenario;
