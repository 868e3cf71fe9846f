//! Ordinary least squares with t-test significance per coefficient.
//!
//! The normal equations are solved with a Cholesky factorisation of `HᵀH`.
//! Standard errors come from `s² (HᵀH)⁻¹` and two-sided p-values from a
//! Student's t distribution with `n - p` degrees of freedom.

use nalgebra::{Cholesky, DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Smallest accepted ratio `min(diag L)² / max(diag L)²` of the Gram
/// matrix's Cholesky factor. Below this the design is treated as rank
/// deficient.
const MIN_GRAM_CONDITION: f64 = 1e-12;

/// Result of an OLS fit.
#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    /// Estimated coefficients, one per design column.
    pub coefficients: DVector<f64>,
    /// Standard error of each coefficient.
    pub standard_errors: Vec<f64>,
    /// Two-sided p-value of each coefficient against zero.
    pub p_values: Vec<f64>,
    /// Residuals `y - Hβ`.
    pub residuals: DVector<f64>,
    /// Residual variance `RSS / (n - p)`.
    pub residual_variance: f64,
    /// Residual degrees of freedom `n - p`.
    pub degrees_of_freedom: usize,
}

/// Fit `y ≈ Hβ` by ordinary least squares.
///
/// Returns `None` if there are no residual degrees of freedom or the design
/// matrix is (numerically) rank deficient.
pub fn ordinary_least_squares(
    design: &DMatrix<f64>,
    response: &DVector<f64>,
) -> Option<LeastSquaresFit> {
    let (n, p) = design.shape();
    if p == 0 || n <= p || response.len() != n {
        return None;
    }

    let gram = design.transpose() * design;
    let chol = Cholesky::new(gram)?;

    let diag = chol.l_dirty().diagonal();
    let (min_d, max_d) = diag
        .iter()
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &d| (lo.min(d), hi.max(d)));
    if !(max_d > 0.0) || (min_d * min_d) / (max_d * max_d) < MIN_GRAM_CONDITION {
        return None;
    }

    let coefficients = chol.solve(&(design.transpose() * response));
    let residuals = response - design * &coefficients;
    let degrees_of_freedom = n - p;
    let residual_variance = residuals.norm_squared() / degrees_of_freedom as f64;

    let gram_inv = chol.inverse();
    let t_dist = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64).ok()?;

    let mut standard_errors = Vec::with_capacity(p);
    let mut p_values = Vec::with_capacity(p);
    for k in 0..p {
        let se = (residual_variance * gram_inv[(k, k)]).max(0.0).sqrt();
        let coef = coefficients[k];
        let p_value = if se > 0.0 {
            let t = (coef / se).abs();
            (2.0 * (1.0 - t_dist.cdf(t))).clamp(0.0, 1.0)
        } else if coef != 0.0 {
            // Exact fit: any non-zero coefficient is unambiguously present
            0.0
        } else {
            1.0
        };
        standard_errors.push(se);
        p_values.push(p_value);
    }

    Some(LeastSquaresFit {
        coefficients,
        standard_errors,
        p_values,
        residuals,
        residual_variance,
        degrees_of_freedom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design_with_intercept(x: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] })
    }

    #[test]
    fn test_recovers_exact_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 / 9.0 * 2.0 - 1.0).collect();
        let y = DVector::from_iterator(10, x.iter().map(|&v| 3.0 + 2.0 * v));
        let fit = ordinary_least_squares(&design_with_intercept(&x), &y).unwrap();
        assert!((fit.coefficients[0] - 3.0).abs() < 1e-10);
        assert!((fit.coefficients[1] - 2.0).abs() < 1e-10);
        assert!(fit.residual_variance < 1e-20);
        assert_eq!(fit.degrees_of_freedom, 8);
    }

    #[test]
    fn test_irrelevant_term_is_insignificant() {
        // y depends on x1 only; x2 is an orthogonal alternating column
        let n = 20;
        let x1: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64 * 2.0 - 1.0).collect();
        let x2: Vec<f64> = (0..n).map(|i| if (i / 2) % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let noise: Vec<f64> = (0..n).map(|i| 0.01 * ((i * 7 % 5) as f64 - 2.0)).collect();
        let design = DMatrix::from_fn(n, 3, |i, j| match j {
            0 => 1.0,
            1 => x1[i],
            _ => x2[i],
        });
        let y = DVector::from_iterator(n, (0..n).map(|i| 1.0 + 4.0 * x1[i] + noise[i]));
        let fit = ordinary_least_squares(&design, &y).unwrap();
        assert!(fit.p_values[1] < 1e-6);
        assert!(fit.p_values[2] > 0.01);
    }

    #[test]
    fn test_rank_deficient_rejected() {
        let x = [0.1, 0.2, 0.3, 0.4];
        let design = DMatrix::from_fn(4, 3, |i, j| if j == 0 { 1.0 } else { x[i] });
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        assert!(ordinary_least_squares(&design, &y).is_none());
    }

    #[test]
    fn test_requires_degrees_of_freedom() {
        let design = design_with_intercept(&[0.0, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        assert!(ordinary_least_squares(&design, &y).is_none());
    }
}
