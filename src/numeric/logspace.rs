//! Log-space arithmetic. `-inf` stands for probability zero.

/// `ln 0`
pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// `ln(e^a + e^b)` without leaving log space. NaN inputs propagate.
#[inline]
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln(sum e^x)` over an iterator; `-inf` for an empty or all-zero input.
pub fn log_sum_exp<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().copied().fold(LOG_ZERO, f64::max);
    if max == LOG_ZERO {
        return LOG_ZERO;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// In-place running `log_add_exp` (log of the cumulative sum).
pub fn log_cum_sum_exp(values: &mut [f64]) {
    for i in 1..values.len() {
        values[i] = log_add_exp(values[i - 1], values[i]);
    }
}

/// `ln(1 - e^x)` for `x <= 0`; `-inf` once `x` reaches 0 (or rounds above it).
pub fn log1m_exp(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x >= 0.0 {
        return LOG_ZERO;
    }
    if x > -std::f64::consts::LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

/// Slack allowed around `[0, 1]` before a probability counts as out of range.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Whether `p` is a probability up to [`PROBABILITY_TOLERANCE`]. NaN is not.
#[inline]
pub fn is_probability(p: f64) -> bool {
    (-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&p)
}

/// `ln p` after clamping `p` into `[0, 1]`.
#[inline]
pub fn ln_clamped(p: f64) -> f64 {
    p.clamp(0.0, 1.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_add_exp_matches_direct_sum() {
        let a = 0.3f64.ln();
        let b = 0.2f64.ln();
        assert!((log_add_exp(a, b).exp() - 0.5).abs() < 1e-12);
        assert!((log_add_exp(b, a).exp() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn log_add_exp_zero_identity() {
        assert_eq!(log_add_exp(LOG_ZERO, -1.5), -1.5);
        assert_eq!(log_add_exp(-1.5, LOG_ZERO), -1.5);
        assert_eq!(log_add_exp(LOG_ZERO, LOG_ZERO), LOG_ZERO);
    }

    #[test]
    fn log_add_exp_far_apart_values() {
        // Naive exp() of both would underflow to zero.
        let r = log_add_exp(-1000.0, -1000.0);
        assert!((r - (-1000.0 + std::f64::consts::LN_2)).abs() < 1e-12);
    }

    #[test]
    fn log_sum_exp_handles_empty_and_zero() {
        assert_eq!(log_sum_exp(Vec::new()), LOG_ZERO);
        assert_eq!(log_sum_exp(vec![LOG_ZERO, LOG_ZERO]), LOG_ZERO);
        let s = log_sum_exp(vec![0.1f64.ln(), 0.2f64.ln(), 0.3f64.ln()]);
        assert!((s.exp() - 0.6).abs() < 1e-12);
        assert!(log_sum_exp(vec![0.0, f64::NAN]).is_nan());
    }

    #[test]
    fn log_cum_sum_exp_running_total() {
        let mut v = vec![0.1f64.ln(), LOG_ZERO, 0.4f64.ln()];
        log_cum_sum_exp(&mut v);
        assert!((v[0].exp() - 0.1).abs() < 1e-12);
        assert!((v[1].exp() - 0.1).abs() < 1e-12);
        assert!((v[2].exp() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn log1m_exp_complement() {
        assert!((log1m_exp(0.25f64.ln()).exp() - 0.75).abs() < 1e-12);
        assert!((log1m_exp(0.9f64.ln()).exp() - 0.1).abs() < 1e-12);
        assert_eq!(log1m_exp(0.0), LOG_ZERO);
        assert_eq!(log1m_exp(1e-12), LOG_ZERO);
        assert_eq!(log1m_exp(LOG_ZERO), 0.0);
    }

    #[test]
    fn ln_clamped_bounds() {
        assert_eq!(ln_clamped(1.0000001), 0.0);
        assert_eq!(ln_clamped(-1e-9), LOG_ZERO);
    }

    #[test]
    fn probability_range_check() {
        assert!(is_probability(0.0));
        assert!(is_probability(1.0 + 1e-15));
        assert!(!is_probability(1.2));
        assert!(!is_probability(-0.01));
        assert!(!is_probability(f64::NAN));
    }
}
