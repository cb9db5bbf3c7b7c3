//! Shared numeric helpers: log-space arithmetic, dense log tables, and
//! tie-aware score comparisons.

pub mod compare;
pub mod logspace;
pub mod table;

pub use compare::{Comparison, ScoreCdf};
pub use logspace::{
    is_probability, ln_clamped, log1m_exp, log_add_exp, log_cum_sum_exp, log_sum_exp, LOG_ZERO,
    PROBABILITY_TOLERANCE,
};
pub use table::LogTable;
