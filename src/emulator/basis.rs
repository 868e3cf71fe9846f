//! Regression basis construction and active variable selection.
//!
//! The candidate basis holds a constant, one linear term per parameter and,
//! when there are enough runs to estimate them, every pairwise quadratic
//! term `x_i x_j` (`i <= j`). A parameter is *active* if any term involving
//! it is significant in the candidate fit. The regression is then refit on
//! the constant, the linear terms of active parameters and the significant
//! quadratic terms among active parameters.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, FittingFailure, Result};
use crate::statistics::{ordinary_least_squares, LeastSquaresFit};

/// One term of the regression surface, over scaled parameter coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisFunction {
    /// Intercept.
    Constant,
    /// `x_i`.
    Linear(usize),
    /// `x_i * x_j` with `i <= j`.
    Quadratic(usize, usize),
}

impl BasisFunction {
    /// Evaluate at a scaled point.
    #[inline]
    pub fn evaluate(&self, scaled: &[f64]) -> f64 {
        match *self {
            Self::Constant => 1.0,
            Self::Linear(i) => scaled[i],
            Self::Quadratic(i, j) => scaled[i] * scaled[j],
        }
    }

    /// Whether the term depends on parameter `k`.
    pub fn involves(&self, k: usize) -> bool {
        match *self {
            Self::Constant => false,
            Self::Linear(i) => i == k,
            Self::Quadratic(i, j) => i == k || j == k,
        }
    }

    /// Polynomial degree of the term.
    pub fn degree(&self) -> usize {
        match self {
            Self::Constant => 0,
            Self::Linear(_) => 1,
            Self::Quadratic(..) => 2,
        }
    }

    /// Human-readable form such as `beta`, `beta:gamma` or `beta^2`.
    pub fn label(&self, names: &[String]) -> String {
        match *self {
            Self::Constant => "1".to_string(),
            Self::Linear(i) => names[i].clone(),
            Self::Quadratic(i, j) if i == j => format!("{}^2", names[i]),
            Self::Quadratic(i, j) => format!("{}:{}", names[i], names[j]),
        }
    }
}

/// Ordered list of basis functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionBasis {
    functions: Vec<BasisFunction>,
}

impl RegressionBasis {
    /// Wrap an explicit list of terms.
    pub fn from_functions(functions: Vec<BasisFunction>) -> Self {
        Self { functions }
    }

    /// Constant plus one linear term per parameter.
    pub fn linear(dim: usize) -> Self {
        let mut functions = vec![BasisFunction::Constant];
        functions.extend((0..dim).map(BasisFunction::Linear));
        Self { functions }
    }

    /// Constant, linear and all pairwise quadratic terms.
    pub fn quadratic(dim: usize) -> Self {
        let mut basis = Self::linear(dim);
        for i in 0..dim {
            for j in i..dim {
                basis.functions.push(BasisFunction::Quadratic(i, j));
            }
        }
        basis
    }

    /// Number of terms in a full quadratic basis over `dim` parameters.
    pub fn quadratic_len(dim: usize) -> usize {
        1 + dim + dim * (dim + 1) / 2
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the basis has no terms.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Terms in order.
    pub fn functions(&self) -> &[BasisFunction] {
        &self.functions
    }

    /// Evaluate every term at a scaled point.
    pub fn evaluate(&self, scaled: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.functions.len(),
            self.functions.iter().map(|f| f.evaluate(scaled)),
        )
    }

    /// Design matrix with one row per point and one column per term.
    pub fn design_matrix(&self, points: &[Vec<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(points.len(), self.functions.len(), |i, j| {
            self.functions[j].evaluate(&points[i])
        })
    }
}

/// Outcome of active variable selection.
#[derive(Debug, Clone)]
pub struct SelectedRegression {
    /// `active[k]` is true if parameter `k` enters the surrogate.
    pub active: Vec<bool>,
    /// Basis restricted to active parameters.
    pub basis: RegressionBasis,
    /// Least squares fit on the restricted basis.
    pub fit: LeastSquaresFit,
}

/// Choose active parameters and fit the restricted regression.
///
/// # Arguments
///
/// * `output` - Output name (for error reporting)
/// * `inputs` - Training points in scaled coordinates
/// * `response` - Output values at those points
/// * `significance` - p-value below which a term counts as significant
/// * `max_degree` - 1 for linear-only candidates, 2 to allow quadratic terms
pub fn select_regression(
    output: &str,
    inputs: &[Vec<f64>],
    response: &DVector<f64>,
    significance: f64,
    max_degree: usize,
) -> Result<SelectedRegression> {
    let n = inputs.len();
    let dim = inputs.first().map_or(0, Vec::len);
    let rank_deficient = || Error::Fitting {
        output: output.to_string(),
        failure: FittingFailure::RegressionRankDeficient,
    };

    if n < dim + 2 {
        return Err(Error::InsufficientTrainingData {
            available: n,
            required: dim + 2,
        });
    }

    let quadratic_ok = max_degree >= 2 && n >= RegressionBasis::quadratic_len(dim) + 2;
    let (candidate, candidate_fit) = if quadratic_ok {
        let basis = RegressionBasis::quadratic(dim);
        match ordinary_least_squares(&basis.design_matrix(inputs), response) {
            Some(fit) => (basis, fit),
            None => linear_candidate(inputs, response, dim).ok_or_else(rank_deficient)?,
        }
    } else {
        linear_candidate(inputs, response, dim).ok_or_else(rank_deficient)?
    };

    let significant: Vec<bool> = candidate_fit
        .p_values
        .iter()
        .map(|&p| p < significance)
        .collect();

    let mut active: Vec<bool> = (0..dim)
        .map(|k| {
            candidate
                .functions()
                .iter()
                .zip(&significant)
                .any(|(f, &sig)| sig && f.involves(k))
        })
        .collect();

    if !active.iter().any(|&a| a) {
        // Keep the single most influential parameter so the correlated
        // residual process still has a direction to vary along.
        let best = (0..dim)
            .min_by(|&a, &b| {
                let pa = min_p_involving(&candidate, &candidate_fit, a);
                let pb = min_p_involving(&candidate, &candidate_fit, b);
                pa.total_cmp(&pb)
            })
            .unwrap_or(0);
        active[best] = true;
    }

    let mut functions = vec![BasisFunction::Constant];
    functions.extend((0..dim).filter(|&k| active[k]).map(BasisFunction::Linear));
    let quadratics: Vec<BasisFunction> = candidate
        .functions()
        .iter()
        .zip(&significant)
        .filter_map(|(f, &sig)| match *f {
            BasisFunction::Quadratic(i, j) if sig && active[i] && active[j] => Some(*f),
            _ => None,
        })
        .collect();

    let with_quadratics = {
        let mut all = functions.clone();
        all.extend(quadratics.iter().copied());
        RegressionBasis::from_functions(all)
    };
    if let Some(fit) = ordinary_least_squares(&with_quadratics.design_matrix(inputs), response) {
        debug!(
            output,
            active = active.iter().filter(|&&a| a).count(),
            terms = with_quadratics.len(),
            "selected regression basis"
        );
        return Ok(SelectedRegression {
            active,
            basis: with_quadratics,
            fit,
        });
    }

    let linear_only = RegressionBasis::from_functions(functions);
    let fit = ordinary_least_squares(&linear_only.design_matrix(inputs), response)
        .ok_or_else(rank_deficient)?;
    Ok(SelectedRegression {
        active,
        basis: linear_only,
        fit,
    })
}

fn linear_candidate(
    inputs: &[Vec<f64>],
    response: &DVector<f64>,
    dim: usize,
) -> Option<(RegressionBasis, LeastSquaresFit)> {
    let basis = RegressionBasis::linear(dim);
    let fit = ordinary_least_squares(&basis.design_matrix(inputs), response)?;
    Some((basis, fit))
}

fn min_p_involving(basis: &RegressionBasis, fit: &LeastSquaresFit, k: usize) -> f64 {
    basis
        .functions()
        .iter()
        .zip(&fit.p_values)
        .filter(|(f, _)| f.involves(k))
        .map(|(_, &p)| p)
        .fold(f64::INFINITY, f64::min)
}
