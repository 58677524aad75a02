// ─────────────────────────────────────────────────────────────────────
// Extreme Deconvolution — Log-Domain Arithmetic
// ─────────────────────────────────────────────────────────────────────
//! Stable log-sum-exp. Responsibility rows live entirely in the log
//! domain; components with zero amplitude contribute `-∞` entries and
//! must pass through without poisoning the row with NaN.

/// log Σ exp(v_i), computed against the row maximum.
///
/// `-∞` entries (zero-probability terms) are skipped; an all-`-∞` or
/// empty input returns `-∞`. NaN inputs propagate to the result.
pub fn logsumexp(vals: &[f64]) -> f64 {
    let mut max = f64::NEG_INFINITY;
    for &v in vals {
        if v.is_nan() {
            return f64::NAN;
        }
        if v > max {
            max = v;
        }
    }
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let mut sum = 0.0;
    for &v in vals {
        if v > f64::NEG_INFINITY {
            sum += (v - max).exp();
        }
    }
    max + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logsumexp_two_equal() {
        // log(e^0 + e^0) = ln 2
        assert!((logsumexp(&[0.0, 0.0]) - 2.0_f64.ln()).abs() < 1e-14);
    }

    #[test]
    fn test_logsumexp_large_offsets() {
        // Stable far outside the naive exp range
        let v = logsumexp(&[-1000.0, -1000.0]);
        assert!((v - (-1000.0 + 2.0_f64.ln())).abs() < 1e-10);
        let v = logsumexp(&[700.0, 710.0]);
        assert!((v - (710.0 + (1.0 + (-10.0_f64).exp()).ln())).abs() < 1e-10);
    }

    #[test]
    fn test_logsumexp_neg_infinity_entries() {
        let v = logsumexp(&[f64::NEG_INFINITY, 0.0, f64::NEG_INFINITY]);
        assert!((v - 0.0).abs() < 1e-14);
    }

    #[test]
    fn test_logsumexp_all_neg_infinity() {
        assert_eq!(
            logsumexp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]),
            f64::NEG_INFINITY
        );
        assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_logsumexp_dominated_term() {
        // The tiny term is absorbed without drama
        let v = logsumexp(&[0.0, -800.0]);
        assert!((v - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_logsumexp_nan_propagates() {
        assert!(logsumexp(&[0.0, f64::NAN]).is_nan());
    }
}
