//! Bayes-linear emulator for a single simulator output.
//!
//! ## Model
//!
//! ```text
//! f(x) = h(x)ᵀβ + u(x)
//! ```
//!
//! where `h(x)` is the regression basis, `β` the fitted coefficients (treated
//! as known), and `u(x)` a zero-mean stationary process with variance `σ²` and
//! correlation `c(x, x')`.
//!
//! ## Adjustment
//!
//! Given training runs `X` with outputs `F(X)`, the Bayes-linear adjusted
//! moments at `x` are
//!
//! ```text
//! E[f(x)]   = h(x)ᵀβ + r(x)ᵀ R⁻¹ (F(X) - H(X)β)
//! Var[f(x)] = σ² (1 - r(x)ᵀ R⁻¹ r(x))
//! ```
//!
//! with `R = c(X, X)` and `r(x) = c(X, x)`. `R` does not depend on `σ²`, so
//! its Cholesky factor is computed once at fit time and shared by every
//! rescaled copy produced by [`Emulator::mult_sigma`].

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::{Cholesky, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{DUPLICATE_TOLERANCE, MIN_RECIPROCAL_CONDITION};
use crate::error::{Error, FittingFailure, Result};
use crate::statistics::sample_variance;
use crate::types::{ParameterSpace, TrainingSet};

use super::basis::{select_regression, BasisFunction, RegressionBasis};
use super::correlation::{Correlation, Kernel};
use super::hyperparameters::{
    FixedHyperparameters, HyperparameterProblem, HyperparameterStrategy, LikelihoodGrid,
};

/// Options controlling how emulators are fit.
#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    /// Correlation kernel family. Default: squared exponential.
    pub kernel: Kernel,

    /// Hyperparameter estimation strategy. Default: [`LikelihoodGrid`].
    pub hyperparameters: Arc<dyn HyperparameterStrategy>,

    /// p-value below which a regression term is significant. Default: 0.05.
    pub significance: f64,

    /// Highest polynomial degree in the candidate basis (1 or 2). Default: 2.
    pub max_degree: usize,

    /// Model discrepancy variance per output name. Default: none.
    pub discrepancies: BTreeMap<String, f64>,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            kernel: Kernel::default(),
            hyperparameters: Arc::new(LikelihoodGrid::default()),
            significance: 0.05,
            max_degree: 2,
            discrepancies: BTreeMap::new(),
        }
    }
}

impl EmulatorOptions {
    /// Set the kernel family.
    pub fn kernel(mut self, kernel: Kernel) -> Self {
        if let Kernel::RationalQuadratic { alpha } = kernel {
            assert!(alpha > 0.0, "rational quadratic alpha must be > 0");
        }
        self.kernel = kernel;
        self
    }

    /// Use a fixed correlation length and nugget instead of estimating them.
    pub fn fixed_hyperparameters(self, theta: f64, nugget: f64) -> Self {
        assert!(theta > 0.0, "correlation length must be > 0");
        assert!(
            (0.0..1.0).contains(&nugget),
            "nugget must be in [0, 1)"
        );
        self.hyperparameter_strategy(Arc::new(FixedHyperparameters::new(theta, nugget)))
    }

    /// Use a custom hyperparameter strategy.
    pub fn hyperparameter_strategy(mut self, strategy: Arc<dyn HyperparameterStrategy>) -> Self {
        self.hyperparameters = strategy;
        self
    }

    /// Set the significance level for active variable selection.
    pub fn significance(mut self, p: f64) -> Self {
        assert!(p > 0.0 && p < 1.0, "significance must be in (0, 1)");
        self.significance = p;
        self
    }

    /// Set the highest polynomial degree of the candidate basis.
    pub fn max_degree(mut self, degree: usize) -> Self {
        assert!((1..=2).contains(&degree), "max_degree must be 1 or 2");
        self.max_degree = degree;
        self
    }

    /// Attach a model discrepancy variance to an output.
    pub fn discrepancy(mut self, output: impl Into<String>, variance: f64) -> Self {
        assert!(variance >= 0.0, "discrepancy variance must be >= 0");
        self.discrepancies.insert(output.into(), variance);
        self
    }
}

/// Adjusted expectation and variance at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Adjusted expectation `E[f(x)]`.
    pub expectation: f64,
    /// Adjusted variance `Var[f(x)]`, never negative.
    pub variance: f64,
}

/// Fitted emulator for one output.
///
/// Immutable once fit: [`Emulator::mult_sigma`] and
/// [`Emulator::with_discrepancy`] return new emulators.
#[derive(Debug, Clone)]
pub struct Emulator {
    output: String,
    domain: ParameterSpace,
    active: Vec<bool>,
    basis: RegressionBasis,
    coefficients: DVector<f64>,
    sigma_squared: f64,
    correlation: Correlation,
    discrepancy: f64,
    training_inputs: Vec<Vec<f64>>,
    training_outputs: Vec<f64>,
    factor: Arc<Cholesky<f64, Dyn>>,
    weights: DVector<f64>,
}

impl Emulator {
    /// Fit an emulator for `output` on `training`, scaled to `domain`.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] or [`Error::ParameterNameMismatch`] if
    ///   the training columns are not the domain's parameters, in order
    /// - [`Error::InsufficientTrainingData`] with too few runs for the basis
    /// - [`Error::Fitting`] for duplicate runs, a singular or ill-conditioned
    ///   training covariance, a rank-deficient regression, or failed
    ///   hyperparameter estimation
    pub fn fit(
        training: &TrainingSet,
        output: &str,
        domain: &ParameterSpace,
        options: &EmulatorOptions,
    ) -> Result<Self> {
        if training.parameter_names().len() != domain.dim() {
            return Err(Error::DimensionMismatch {
                expected: domain.dim(),
                actual: training.parameter_names().len(),
            });
        }
        if !training.parameter_names().iter().map(String::as_str).eq(domain.names()) {
            return Err(Error::ParameterNameMismatch {
                expected: domain.names().map(str::to_string).collect(),
                actual: training.parameter_names().to_vec(),
            });
        }
        let fitting = |failure| Error::Fitting {
            output: output.to_string(),
            failure,
        };

        let outputs = training.output_column(output)?;
        let inputs: Vec<Vec<f64>> = training
            .points()
            .iter()
            .map(|p| domain.to_scaled(p.parameters()))
            .collect();

        if let Some((first, second, distance)) = closest_pair_within(&inputs, DUPLICATE_TOLERANCE) {
            return Err(fitting(FittingFailure::DuplicateTrainingPoints {
                first,
                second,
                distance,
            }));
        }

        let response = DVector::from_column_slice(&outputs);
        let selected = select_regression(
            output,
            &inputs,
            &response,
            options.significance,
            options.max_degree,
        )?;

        // An exact regression fit leaves no residual variability; keep a
        // tiny process variance so the adjustment stays well defined.
        let scale = sample_variance(&outputs).max(1.0);
        let sigma_squared = selected.fit.residual_variance.max(1e-12 * scale);

        let active_idx: Vec<usize> = (0..domain.dim()).filter(|&k| selected.active[k]).collect();
        let hp = options
            .hyperparameters
            .estimate(&HyperparameterProblem {
                kernel: options.kernel,
                inputs: &inputs,
                active: &active_idx,
                residuals: &selected.fit.residuals,
            })
            .ok_or_else(|| fitting(FittingFailure::HyperparameterEstimation))?;
        let correlation = Correlation::isotropic(options.kernel, active_idx, hp.theta, hp.nugget);

        let factor = Cholesky::new(correlation.matrix(&inputs))
            .ok_or_else(|| fitting(FittingFailure::SingularCovariance))?;
        let reciprocal_condition = cholesky_reciprocal_condition(&factor);
        if reciprocal_condition < MIN_RECIPROCAL_CONDITION {
            return Err(fitting(FittingFailure::IllConditioned {
                reciprocal_condition,
            }));
        }
        let weights = factor.solve(&selected.fit.residuals);

        debug!(
            output,
            n = inputs.len(),
            terms = selected.basis.len(),
            sigma = sigma_squared.sqrt(),
            theta = hp.theta,
            "fitted emulator"
        );

        Ok(Self {
            output: output.to_string(),
            domain: domain.clone(),
            active: selected.active,
            basis: selected.basis,
            coefficients: selected.fit.coefficients,
            sigma_squared,
            correlation,
            discrepancy: options.discrepancies.get(output).copied().unwrap_or(0.0),
            training_inputs: inputs,
            training_outputs: outputs,
            factor: Arc::new(factor),
            weights,
        })
    }

    /// Adjusted expectation and variance at `x` (original units).
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have one value per domain parameter.
    pub fn predict(&self, x: &[f64]) -> Prediction {
        let u = self.scaled_query(x);
        let prior_mean = self.basis.evaluate(&u).dot(&self.coefficients);
        let r = self.cross_correlation(&u);
        let expectation = prior_mean + r.dot(&self.weights);
        let explained = r.dot(&self.factor.solve(&r));
        let variance = (self.sigma_squared * (1.0 - explained)).max(0.0);
        Prediction {
            expectation,
            variance,
        }
    }

    /// Adjusted expectation `E[f(x)]`.
    ///
    /// # Panics
    ///
    /// Panics if `x` does not have one value per domain parameter.
    pub fn expectation(&self, x: &[f64]) -> f64 {
        let u = self.scaled_query(x);
        self.basis.evaluate(&u).dot(&self.coefficients) + self.cross_correlation(&u).dot(&self.weights)
    }

    /// Adjusted variance `Var[f(x)]`, floored at zero.
    pub fn variance(&self, x: &[f64]) -> f64 {
        self.predict(x).variance
    }

    /// Adjusted covariance `Cov[f(x), f(y)]`.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` does not have one value per domain parameter.
    pub fn covariance(&self, x: &[f64], y: &[f64]) -> f64 {
        let ux = self.scaled_query(x);
        let uy = self.scaled_query(y);
        let rx = self.cross_correlation(&ux);
        let ry = self.cross_correlation(&uy);
        let prior = self.correlation.correlation(&ux, &uy);
        self.sigma_squared * (prior - rx.dot(&self.factor.solve(&ry)))
    }

    /// Copy with `σ²` scaled by `factor²`.
    ///
    /// Expectation and correlation structure are unchanged; variance scales
    /// exactly by `factor²` everywhere.
    pub fn mult_sigma(&self, factor: f64) -> Self {
        assert!(
            factor.is_finite() && factor > 0.0,
            "sigma multiplier must be positive and finite"
        );
        Self {
            sigma_squared: self.sigma_squared * factor * factor,
            ..self.clone()
        }
    }

    /// Copy carrying a model discrepancy variance.
    pub fn with_discrepancy(&self, variance: f64) -> Self {
        assert!(variance >= 0.0, "discrepancy variance must be >= 0");
        Self {
            discrepancy: variance,
            ..self.clone()
        }
    }

    fn scaled_query(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(
            x.len(),
            self.domain.dim(),
            "query point has {} values for {} parameters",
            x.len(),
            self.domain.dim()
        );
        self.domain.to_scaled(x)
    }

    fn cross_correlation(&self, u: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.training_inputs.len(),
            self.training_inputs
                .iter()
                .map(|xi| self.correlation.correlation(u, xi)),
        )
    }

    /// Name of the emulated output.
    pub fn output_name(&self) -> &str {
        &self.output
    }

    /// Parameter space the emulator was trained in.
    pub fn valid_domain(&self) -> &ParameterSpace {
        &self.domain
    }

    /// Whether `x` lies in the training domain.
    pub fn in_domain(&self, x: &[f64]) -> bool {
        self.domain.contains(x)
    }

    /// Names of active parameters.
    pub fn active_variables(&self) -> Vec<&str> {
        self.domain
            .names()
            .zip(&self.active)
            .filter(|(_, &a)| a)
            .map(|(n, _)| n)
            .collect()
    }

    /// Active flag per parameter.
    pub fn active_mask(&self) -> &[bool] {
        &self.active
    }

    /// Regression terms.
    pub fn basis_functions(&self) -> &[BasisFunction] {
        self.basis.functions()
    }

    /// Regression terms as readable labels.
    pub fn basis_labels(&self) -> Vec<String> {
        let names: Vec<String> = self.domain.names().map(str::to_string).collect();
        self.basis
            .functions()
            .iter()
            .map(|f| f.label(&names))
            .collect()
    }

    /// Regression coefficients, aligned with [`Self::basis_functions`].
    pub fn coefficients(&self) -> &[f64] {
        self.coefficients.as_slice()
    }

    /// Residual process variance `σ²`.
    pub fn sigma_squared(&self) -> f64 {
        self.sigma_squared
    }

    /// Correlation structure.
    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    /// Model discrepancy variance `Vm`.
    pub fn discrepancy(&self) -> f64 {
        self.discrepancy
    }

    /// Number of training runs.
    pub fn training_len(&self) -> usize {
        self.training_inputs.len()
    }

    /// Training runs in original units, paired with their outputs.
    pub fn training_runs(&self) -> impl Iterator<Item = (Vec<f64>, f64)> + '_ {
        self.training_inputs
            .iter()
            .zip(&self.training_outputs)
            .map(|(u, &y)| (self.domain.from_scaled(u), y))
    }
}

/// First pair of points closer than `tolerance`, with their distance.
fn closest_pair_within(points: &[Vec<f64>], tolerance: f64) -> Option<(usize, usize, f64)> {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            if d < tolerance {
                return Some((i, j, d));
            }
        }
    }
    None
}

/// `min(diag L)² / max(diag L)²`, a cheap proxy for the reciprocal condition
/// number of `L Lᵀ`.
fn cholesky_reciprocal_condition(factor: &Cholesky<f64, Dyn>) -> f64 {
    let diag = factor.l_dirty().diagonal();
    let (lo, hi) = diag
        .iter()
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &d| (lo.min(d), hi.max(d)));
    if hi > 0.0 {
        (lo * lo) / (hi * hi)
    } else {
        0.0
    }
}
