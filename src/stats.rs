//! Two-sample distribution comparison used by the drift test.
//!
//! The Kolmogorov-Smirnov statistic is exact; the p-value uses the
//! asymptotic Q_KS series with the small-sample correction factor.

/// Outcome of a two-sample Kolmogorov-Smirnov test.
#[derive(Debug, Clone, Copy)]
pub struct KsResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Two-sample Kolmogorov-Smirnov test over the marginal distributions of
/// `base` and `current`. Either sample being empty yields a neutral result
/// (statistic 0, p-value 1) rather than an error.
pub fn ks_2samp(base: &[f64], current: &[f64]) -> KsResult {
    if base.is_empty() || current.is_empty() {
        return KsResult {
            statistic: 0.0,
            p_value: 1.0,
        };
    }

    let mut a = base.to_vec();
    let mut b = current.to_vec();
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));

    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let mut i = 0usize;
    let mut j = 0usize;
    let mut statistic: f64 = 0.0;

    // Walk both empirical CDFs in merge order and track the supremum gap.
    while i < a.len() && j < b.len() {
        let d1 = a[i];
        let d2 = b[j];
        if d1 <= d2 {
            i += 1;
        }
        if d2 <= d1 {
            j += 1;
        }
        let gap = (i as f64 / n1 - j as f64 / n2).abs();
        if gap > statistic {
            statistic = gap;
        }
    }

    let effective_n = ((n1 * n2) / (n1 + n2)).sqrt();
    let lambda = (effective_n + 0.12 + 0.11 / effective_n) * statistic;
    KsResult {
        statistic,
        p_value: q_ks(lambda),
    }
}

/// Asymptotic Kolmogorov distribution tail Q_KS(lambda). Monotone from 1
/// (lambda -> 0) down to 0.
fn q_ks(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut factor = 2.0;
    let mut sum = 0.0;
    let mut previous_term = 0.0;
    for j in 1..=100 {
        let term = factor * (a2 * (j * j) as f64).exp();
        sum += term;
        if term.abs() <= 0.001 * previous_term || term.abs() <= 1e-8 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        factor = -factor;
        previous_term = term.abs();
    }
    // Series did not converge, which only happens for vanishing lambda.
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_samples_have_p_value_one() {
        let sample: Vec<f64> = (0..50).map(|i| i as f64 * 0.3).collect();
        let result = ks_2samp(&sample, &sample);
        assert_eq!(result.statistic, 0.0);
        assert!((result.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_ranges_are_significant() {
        let low: Vec<f64> = (0..60).map(|i| i as f64 * 0.1).collect();
        let high: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.1).collect();
        let result = ks_2samp(&low, &high);
        assert_eq!(result.statistic, 1.0);
        assert!(result.p_value < 0.05);
    }

    #[test]
    fn shifted_overlapping_samples_sit_between_the_extremes() {
        let base: Vec<f64> = (0..100).map(|i| i as f64 * 0.05).collect();
        let shifted: Vec<f64> = base.iter().map(|v| v + 0.8).collect();
        let result = ks_2samp(&base, &shifted);
        assert!(result.statistic > 0.0 && result.statistic < 1.0);
        assert!(result.p_value > 0.0 && result.p_value < 1.0);
    }

    #[test]
    fn empty_samples_are_neutral() {
        let result = ks_2samp(&[], &[1.0, 2.0]);
        assert_eq!(result.statistic, 0.0);
        assert_eq!(result.p_value, 1.0);
    }
}
