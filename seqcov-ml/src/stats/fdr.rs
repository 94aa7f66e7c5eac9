//! Benjamini-Hochberg false discovery rate correction.
//!
//! The default [`FdrMethod::Simplified`] scales each p-value by `m / rank`
//! and stops there: q-values are not forced to be monotone in p. Peak calls
//! made with the historical pipeline depend on that, so the canonical
//! step-up pass is opt-in via [`FdrMethod::Monotone`].
//!
//! Scaling is done in floating point. Older tooling floor-divided
//! `p * m // rank`, which collapsed most small q-values to exactly zero.

use seqcov_core::FdrMethod;

/// Convert p-values to q-values, returned in the original order.
///
/// Ranks come from a stable ascending sort, so equal p-values keep their
/// input order. NaN p-values sort last and produce NaN q-values.
pub fn benjamini_hochberg(p_values: &[f64], method: FdrMethod) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut q_values = vec![0.0; m];
    match method {
        FdrMethod::Simplified => {
            for (i, &k) in order.iter().enumerate() {
                q_values[k] = p_values[k] * m as f64 / (i + 1) as f64;
            }
        }
        FdrMethod::Monotone => {
            let mut running_min = f64::INFINITY;
            for (i, &k) in order.iter().enumerate().rev() {
                let q = p_values[k] * m as f64 / (i + 1) as f64;
                if q < running_min {
                    running_min = q;
                }
                q_values[k] = if q.is_nan() { q } else { running_min.min(1.0) };
            }
        }
    }
    q_values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_p_values_get_equal_q_values_in_monotone_mode() {
        let q = benjamini_hochberg(&[0.5, 0.5, 0.5, 0.5], FdrMethod::Monotone);
        assert_eq!(q, vec![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_simplified_ties_follow_input_order() {
        // ranks 1..4 in input order: 0.5*4/1, 0.5*4/2, 0.5*4/3, 0.5*4/4
        let q = benjamini_hochberg(&[0.5, 0.5, 0.5, 0.5], FdrMethod::Simplified);
        assert_eq!(q[0], 2.0);
        assert_eq!(q[1], 1.0);
        assert!((q[2] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(q[3], 0.5);
    }

    #[test]
    fn test_simplified_restores_original_order() {
        let p = [0.04, 0.001, 0.03, 0.2];
        let q = benjamini_hochberg(&p, FdrMethod::Simplified);
        // sorted: 0.001(r1) 0.03(r2) 0.04(r3) 0.2(r4), m = 4
        assert!((q[1] - 0.004).abs() < 1e-12);
        assert!((q[2] - 0.06).abs() < 1e-12);
        assert!((q[0] - 0.04 * 4.0 / 3.0).abs() < 1e-12);
        assert!((q[3] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_simplified_is_not_monotone() {
        // rank 1 -> 0.02 * 3 = 0.06, rank 2 -> 0.021 * 3 / 2 = 0.0315
        let q = benjamini_hochberg(&[0.02, 0.021, 0.9], FdrMethod::Simplified);
        assert!(q[0] > q[1]);

        let q = benjamini_hochberg(&[0.02, 0.021, 0.9], FdrMethod::Monotone);
        assert!(q[0] <= q[1]);
        assert!((q[0] - 0.0315).abs() < 1e-12);
    }

    #[test]
    fn test_small_p_values_are_not_truncated() {
        let q = benjamini_hochberg(&[1e-6, 0.5], FdrMethod::Simplified);
        assert!(q[0] > 0.0);
        assert!((q[0] - 2e-6).abs() < 1e-15);
    }

    #[test]
    fn test_monotone_clamps_to_one() {
        let q = benjamini_hochberg(&[0.9, 0.95], FdrMethod::Monotone);
        assert!(q.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn test_empty_input() {
        assert!(benjamini_hochberg(&[], FdrMethod::Simplified).is_empty());
    }
}
