//! Correlation hyperparameter estimation.
//!
//! Estimation is pluggable: an emulator fit asks a [`HyperparameterStrategy`]
//! for a correlation length and nugget given the regression residuals. Two
//! strategies ship with the crate:
//!
//! - [`FixedHyperparameters`]: use caller-supplied values as-is.
//! - [`LikelihoodGrid`]: maximise the profile Gaussian log-likelihood of the
//!   residuals over a log-spaced grid of isotropic correlation lengths.

use std::fmt;

use nalgebra::{Cholesky, DVector};

use super::correlation::{Correlation, Kernel};

/// Correlation length (scaled units) and nugget proportion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperparameters {
    /// Correlation length shared by all active parameters.
    pub theta: f64,
    /// Nugget as a proportion of the process variance, in `[0, 1)`.
    pub nugget: f64,
}

/// Inputs available to a hyperparameter strategy.
#[derive(Debug, Clone, Copy)]
pub struct HyperparameterProblem<'a> {
    /// Kernel family in use.
    pub kernel: Kernel,
    /// Training points in scaled coordinates.
    pub inputs: &'a [Vec<f64>],
    /// Indices of active parameters.
    pub active: &'a [usize],
    /// Regression residuals at the training points.
    pub residuals: &'a DVector<f64>,
}

/// Strategy for choosing correlation hyperparameters.
pub trait HyperparameterStrategy: fmt::Debug + Send + Sync {
    /// Estimate hyperparameters, or `None` if no usable value exists.
    fn estimate(&self, problem: &HyperparameterProblem<'_>) -> Option<Hyperparameters>;
}

/// Caller-supplied hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedHyperparameters(pub Hyperparameters);

impl FixedHyperparameters {
    /// Fixed correlation length and nugget.
    pub fn new(theta: f64, nugget: f64) -> Self {
        Self(Hyperparameters { theta, nugget })
    }
}

impl HyperparameterStrategy for FixedHyperparameters {
    fn estimate(&self, _problem: &HyperparameterProblem<'_>) -> Option<Hyperparameters> {
        Some(self.0)
    }
}

/// Grid search over correlation lengths by profile likelihood.
///
/// For each candidate `θ` the residual process variance is profiled out:
///
/// ```text
/// σ̂² = rᵀ R⁻¹ r / n
/// ℓ(θ) = -½ (n log σ̂² + log |R|)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodGrid {
    /// Smallest candidate correlation length.
    pub min_theta: f64,
    /// Largest candidate correlation length.
    pub max_theta: f64,
    /// Number of log-spaced candidates.
    pub grid_points: usize,
    /// Nugget proportion used for every candidate.
    pub nugget: f64,
}

impl Default for LikelihoodGrid {
    fn default() -> Self {
        Self {
            min_theta: 0.1,
            max_theta: 3.0,
            grid_points: 30,
            nugget: 1e-4,
        }
    }
}

impl LikelihoodGrid {
    /// Candidate correlation lengths in increasing order.
    pub fn candidates(&self) -> Vec<f64> {
        if self.grid_points <= 1 {
            return vec![self.min_theta];
        }
        let (lo, hi) = (self.min_theta.ln(), self.max_theta.ln());
        let step = (hi - lo) / (self.grid_points - 1) as f64;
        (0..self.grid_points)
            .map(|k| (lo + step * k as f64).exp())
            .collect()
    }
}

impl HyperparameterStrategy for LikelihoodGrid {
    fn estimate(&self, problem: &HyperparameterProblem<'_>) -> Option<Hyperparameters> {
        self.candidates()
            .into_iter()
            .filter_map(|theta| {
                let ll = profile_log_likelihood(problem, theta, self.nugget)?;
                Some((theta, ll))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(theta, _)| Hyperparameters {
                theta,
                nugget: self.nugget,
            })
    }
}

/// Profile log-likelihood of the residuals for a given correlation length.
///
/// Returns `None` if the correlation matrix is not positive definite.
pub fn profile_log_likelihood(
    problem: &HyperparameterProblem<'_>,
    theta: f64,
    nugget: f64,
) -> Option<f64> {
    let n = problem.inputs.len();
    if n == 0 {
        return None;
    }
    let corr = Correlation::isotropic(problem.kernel, problem.active.to_vec(), theta, nugget);
    let chol = Cholesky::new(corr.matrix(problem.inputs))?;
    let log_det: f64 = chol.l_dirty().diagonal().iter().map(|d| 2.0 * d.ln()).sum();
    let quad = problem.residuals.dot(&chol.solve(problem.residuals));
    let sigma2 = quad / n as f64;
    if !(sigma2 > 0.0) || !log_det.is_finite() {
        return None;
    }
    Some(-0.5 * (n as f64 * sigma2.ln() + log_det))
}
