//! Small numeric helpers for the edge estimator.

/// Default kernel bandwidth, in signal-score points.
pub const KERNEL_BANDWIDTH: f64 = 18.0;

pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard normal CDF, Abramowitz–Stegun 26.2.17 approximation.
pub fn normal_cdf(z: f64) -> Option<f64> {
    if !z.is_finite() {
        return None;
    }
    let abs = z.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs);
    let d = 0.398_942_3 * (-abs * abs / 2.0).exp();
    let poly = 0.319_381_5
        + t * (-0.356_563_8 + t * (1.781_478 + t * (-1.821_256 + t * 1.330_274)));
    let prob = 1.0 - d * t * poly;
    Some(if z >= 0.0 { prob } else { 1.0 - prob })
}

/// Gaussian similarity weight for a score distance.
pub fn kernel_weight(distance: f64, bandwidth: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    (-0.5 * (distance / bandwidth).powi(2)).exp()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedMoments {
    pub mean: Option<f64>,
    /// Population variance under the weights.
    pub variance: Option<f64>,
    pub std_dev: Option<f64>,
    pub sum_w: f64,
    /// Kish effective sample size, `(Σw)² / Σw²`.
    pub n_eff: f64,
}

impl WeightedMoments {
    const EMPTY: WeightedMoments = WeightedMoments {
        mean: None,
        variance: None,
        std_dev: None,
        sum_w: 0.0,
        n_eff: 0.0,
    };
}

/// Weighted mean and variance over `(value, weight)` pairs. Pairs with a
/// non-finite value or a non-positive weight are skipped.
pub fn weighted_moments(samples: &[(f64, f64)]) -> WeightedMoments {
    let usable = || {
        samples
            .iter()
            .copied()
            .filter(|(x, w)| x.is_finite() && w.is_finite() && *w > 0.0)
    };

    let (sum_w, sum_w2, sum_wx) = usable().fold((0.0, 0.0, 0.0), |(sw, sw2, swx), (x, w)| {
        (sw + w, sw2 + w * w, swx + w * x)
    });
    if sum_w <= 0.0 {
        return WeightedMoments::EMPTY;
    }

    let mean = sum_wx / sum_w;
    let variance = usable().map(|(x, w)| w * (x - mean).powi(2)).sum::<f64>() / sum_w;
    let n_eff = if sum_w2 > 0.0 { sum_w * sum_w / sum_w2 } else { 0.0 };

    WeightedMoments {
        mean: Some(mean),
        variance: Some(variance),
        std_dev: Some(variance.sqrt()),
        sum_w,
        n_eff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn average_of_empty_is_none() {
        assert_eq!(average(&[]), None);
        assert_relative_eq!(average(&[1.0, 2.0, 6.0]).unwrap(), 3.0);
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert_relative_eq!(normal_cdf(0.0).unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(normal_cdf(1.96).unwrap(), 0.975, epsilon = 1e-4);
        assert_relative_eq!(normal_cdf(-1.0).unwrap(), 0.158_655, epsilon = 1e-4);
        assert_eq!(normal_cdf(f64::NAN), None);
    }

    #[test]
    fn normal_cdf_is_symmetric() {
        for z in [0.3, 1.1, 2.5] {
            let sum = normal_cdf(z).unwrap() + normal_cdf(-z).unwrap();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn kernel_weight_decays_with_distance() {
        assert_relative_eq!(kernel_weight(0.0, KERNEL_BANDWIDTH), 1.0);
        assert_relative_eq!(
            kernel_weight(18.0, KERNEL_BANDWIDTH),
            (-0.5_f64).exp(),
            epsilon = 1e-12
        );
        assert!(kernel_weight(40.0, KERNEL_BANDWIDTH) < kernel_weight(10.0, KERNEL_BANDWIDTH));
        assert_eq!(kernel_weight(f64::INFINITY, KERNEL_BANDWIDTH), 0.0);
    }

    #[test]
    fn equal_weights_match_plain_moments() {
        let m = weighted_moments(&[(1.0, 1.0), (2.0, 1.0), (3.0, 1.0), (4.0, 1.0)]);
        assert_relative_eq!(m.mean.unwrap(), 2.5);
        assert_relative_eq!(m.variance.unwrap(), 1.25);
        assert_relative_eq!(m.sum_w, 4.0);
        assert_relative_eq!(m.n_eff, 4.0);
    }

    #[test]
    fn unequal_weights_shrink_effective_size() {
        let m = weighted_moments(&[(1.0, 1.0), (5.0, 0.25)]);
        assert_relative_eq!(m.mean.unwrap(), (1.0 + 1.25) / 1.25);
        assert!(m.n_eff < 2.0);
        assert!(m.n_eff > 1.0);
    }

    #[test]
    fn skips_non_finite_and_non_positive_weights() {
        let m = weighted_moments(&[(f64::NAN, 1.0), (2.0, 0.0), (3.0, -1.0), (4.0, 2.0)]);
        assert_relative_eq!(m.mean.unwrap(), 4.0);
        assert_relative_eq!(m.variance.unwrap(), 0.0);
        assert_relative_eq!(m.n_eff, 1.0);
    }

    #[test]
    fn empty_input_has_no_moments() {
        assert_eq!(weighted_moments(&[]), WeightedMoments::EMPTY);
    }
}
