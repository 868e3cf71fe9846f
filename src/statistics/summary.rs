//! Sample moments.

/// Arithmetic mean. Returns 0 for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Unbiased sample variance. Returns 0 for fewer than two values.
pub fn sample_variance(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n - 1) as f64
}

/// Sample skewness `g1 = m3 / m2^{3/2}` (population moments).
///
/// Returns 0 for fewer than three values or zero spread.
pub fn sample_skewness(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(data);
    let (m2, m3) = data.iter().fold((0.0, 0.0), |(m2, m3), x| {
        let d = x - m;
        (m2 + d * d, m3 + d * d * d)
    });
    let m2 = m2 / n as f64;
    let m3 = m3 / n as f64;
    if m2 <= 0.0 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Per-column sample standard deviation of row-major points.
pub fn column_std_devs(points: &[Vec<f64>], dim: usize) -> Vec<f64> {
    (0..dim)
        .map(|j| {
            let column: Vec<f64> = points.iter().map(|p| p[j]).collect();
            sample_variance(&column).sqrt()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moments() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&data) - 2.5).abs() < 1e-12);
        assert!((sample_variance(&data) - 5.0 / 3.0).abs() < 1e-12);
        assert!(sample_skewness(&data).abs() < 1e-12);
    }

    #[test]
    fn test_skewness_sign() {
        let right = [0.0, 0.0, 0.0, 0.0, 10.0];
        assert!(sample_skewness(&right) > 0.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(sample_variance(&[1.0]), 0.0);
        assert_eq!(sample_skewness(&[2.0, 2.0, 2.0]), 0.0);
    }
}
