//! Stationary correlation kernels for the residual process.
//!
//! Correlations are computed over the emulator's active parameters in scaled
//! coordinates. The nugget `δ` is a proportion of the process variance:
//!
//! ```text
//! c(x, x') = (1 - δ) · ρ(r) + δ · [x = x'],    r² = Σ_j ((x_j - x'_j) / θ_j)²
//! ```
//!
//! The indicator compares every coordinate (active or not), so two runs that
//! differ only in inactive parameters remain distinct.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

const SQRT_5: f64 = 2.236_067_977_499_79;

/// Kernel family `ρ(r)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kernel {
    /// Squared exponential: `exp(-r²)`.
    #[default]
    ExpSquared,
    /// Matérn 5/2: `(1 + √5 r + 5/3 r²) exp(-√5 r)`.
    Matern52,
    /// Ornstein-Uhlenbeck (exponential): `exp(-r)`.
    OrnsteinUhlenbeck,
    /// Rational quadratic: `(1 + r² / 2α)^-α`.
    RationalQuadratic {
        /// Scale mixture parameter, `α > 0`.
        alpha: f64,
    },
}

impl Kernel {
    /// Correlation at squared scaled distance `r2`.
    #[inline]
    pub fn correlation_at(&self, r2: f64) -> f64 {
        match *self {
            Self::ExpSquared => (-r2).exp(),
            Self::Matern52 => {
                let r = r2.sqrt();
                (1.0 + SQRT_5 * r + 5.0 / 3.0 * r2) * (-SQRT_5 * r).exp()
            }
            Self::OrnsteinUhlenbeck => (-r2.sqrt()).exp(),
            Self::RationalQuadratic { alpha } => (1.0 + r2 / (2.0 * alpha)).powf(-alpha),
        }
    }
}

/// Correlation structure of an emulator's residual process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    kernel: Kernel,
    active: Vec<usize>,
    theta: Vec<f64>,
    nugget: f64,
}

impl Correlation {
    /// Correlation with one length per active parameter.
    pub fn new(kernel: Kernel, active: Vec<usize>, theta: Vec<f64>, nugget: f64) -> Self {
        debug_assert_eq!(active.len(), theta.len());
        debug_assert!((0.0..1.0).contains(&nugget));
        Self {
            kernel,
            active,
            theta,
            nugget,
        }
    }

    /// Correlation sharing a single length across active parameters.
    pub fn isotropic(kernel: Kernel, active: Vec<usize>, theta: f64, nugget: f64) -> Self {
        let theta = vec![theta; active.len()];
        Self::new(kernel, active, theta, nugget)
    }

    /// Kernel family.
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Indices of the parameters the kernel depends on.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    /// Correlation lengths, one per active parameter (scaled units).
    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    /// Nugget as a proportion of the process variance.
    pub fn nugget(&self) -> f64 {
        self.nugget
    }

    /// Correlation between two scaled points.
    pub fn correlation(&self, a: &[f64], b: &[f64]) -> f64 {
        let r2: f64 = self
            .active
            .iter()
            .zip(&self.theta)
            .map(|(&j, &t)| {
                let d = (a[j] - b[j]) / t;
                d * d
            })
            .sum();
        let smooth = (1.0 - self.nugget) * self.kernel.correlation_at(r2);
        if a == b {
            smooth + self.nugget
        } else {
            smooth
        }
    }

    /// Correlation matrix of a point set (unit diagonal).
    pub fn matrix(&self, points: &[Vec<f64>]) -> DMatrix<f64> {
        let n = points.len();
        let mut m = DMatrix::identity(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let c = self.correlation(&points[i], &points[j]);
                m[(i, j)] = c;
                m[(j, i)] = c;
            }
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernels_are_one_at_zero_and_decay() {
        let kernels = [
            Kernel::ExpSquared,
            Kernel::Matern52,
            Kernel::OrnsteinUhlenbeck,
            Kernel::RationalQuadratic { alpha: 1.5 },
        ];
        for k in kernels {
            assert!((k.correlation_at(0.0) - 1.0).abs() < 1e-12, "{k:?}");
            assert!(k.correlation_at(0.5) < 1.0);
            assert!(k.correlation_at(4.0) < k.correlation_at(0.5));
        }
    }

    #[test]
    fn test_exp_squared_matches_formula() {
        let c = Correlation::new(Kernel::ExpSquared, vec![0, 1], vec![0.5, 2.0], 0.0);
        let a = [0.0, 0.0];
        let b = [0.25, 1.0];
        let expected = (-(0.5f64.powi(2) + 0.5f64.powi(2))).exp();
        assert!((c.correlation(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_nugget_only_on_exact_match() {
        let c = Correlation::isotropic(Kernel::ExpSquared, vec![0], 1.0, 0.1);
        // Second coordinate is inactive but still distinguishes the points
        let a = [0.3, 0.0];
        let b = [0.3, 0.5];
        assert!((c.correlation(&a, &a) - 1.0).abs() < 1e-12);
        assert!((c.correlation(&a, &b) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_is_symmetric_with_unit_diagonal() {
        let c = Correlation::isotropic(Kernel::Matern52, vec![0, 1], 0.7, 0.01);
        let pts = vec![vec![0.0, 0.0], vec![0.5, -0.5], vec![-1.0, 1.0]];
        let m = c.matrix(&pts);
        for i in 0..3 {
            assert!((m[(i, i)] - 1.0).abs() < 1e-12);
            for j in 0..3 {
                assert_eq!(m[(i, j)], m[(j, i)]);
            }
        }
    }
}
