use crate::error::{ForecastError, Result};

/// Forgetting factor for a match played `t` days before the cutoff:
/// `k / (c * ln(t) + k)`.
///
/// `c == 0` disables forgetting. Callers must only pass fit-set matches (`t >= 1`);
/// anything that would make the denominator non-positive is rejected.
pub fn decay_weight(t: f64, c: f64, k: f64) -> Result<f64> {
    if c == 0.0 {
        return Ok(1.0);
    }
    if !(t.is_finite() && t > 0.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "elapsed time must be positive, got {t}"
        )));
    }
    let denom = c * t.ln() + k;
    let weight = k / denom;
    if !(denom > 0.0 && weight.is_finite() && weight > 0.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "decay weight out of range for t={t}, c={c}, k={k}"
        )));
    }
    Ok(weight)
}

/// `ln(weight)` without going through the ratio, used by the objective and its gradient.
pub(crate) fn ln_weight(ln_t: f64, c: f64, k: f64) -> f64 {
    (k / (c * ln_t + k)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_c_means_no_decay() {
        for t in [1.0, 2.0, 50.0, 400.0] {
            assert_eq!(decay_weight(t, 0.0, 3.0).unwrap(), 1.0);
        }
    }

    #[test]
    fn weight_is_inside_unit_interval() {
        for t in [1.5, 7.0, 120.0] {
            for c in [0.01, 1.0, 25.0] {
                let w = decay_weight(t, c, 2.0).unwrap();
                assert!(w > 0.0 && w < 1.0, "t={t} c={c} w={w}");
            }
        }
    }

    #[test]
    fn non_increasing_in_c_and_t() {
        let mut prev = 1.0;
        for step in 0..20 {
            let c = step as f64 * 0.5;
            let w = decay_weight(30.0, c, 1.5).unwrap();
            assert!(w <= prev);
            prev = w;
        }

        let mut prev = 1.0;
        for t in [1.0, 2.0, 5.0, 10.0, 100.0, 365.0] {
            let w = decay_weight(t, 0.8, 1.5).unwrap();
            assert!(w <= prev);
            prev = w;
        }
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert!(decay_weight(0.0, 1.0, 1.0).is_err());
        assert!(decay_weight(-3.0, 1.0, 1.0).is_err());
        // ln(0.1) < 0 drives the denominator negative.
        assert!(decay_weight(0.1, 10.0, 1.0).is_err());
    }
}
