//! Standardized-error diagnostic.
//!
//! ```text
//! e(x) = (E[f(x)] - f(x)) / sqrt(Var[f(x)])
//! ```
//!
//! For a calibrated emulator `e` is roughly standard normal. Verdicts, in
//! order of precedence:
//!
//! - **Overconfident**: more than `tolerance` of errors outside `[-3, 3]`
//! - **Biased**: absolute skewness above 1
//! - **Conservative**: at least `1 - tolerance` of errors inside `[-1, 1]`
//! - **Healthy**: otherwise

use serde::{Deserialize, Serialize};

use crate::emulator::{Emulator, Prediction};
use crate::error::Result;
use crate::statistics::sample_skewness;
use crate::types::TrainingSet;

use super::validation_predictions;

const MAX_ABS_SKEWNESS: f64 = 1.0;

/// Shape of the standardized-error distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardizedVerdict {
    /// Approximately standard normal.
    Healthy,
    /// Too many large errors: variance underestimated.
    Overconfident,
    /// Errors concentrated near zero: variance overestimated.
    Conservative,
    /// Errors skewed: systematic bias in the expectation.
    Biased,
}

/// Outcome of the standardized-error diagnostic for one emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedErrors {
    /// Emulated output.
    pub output: String,
    /// Standardized error at each validation point.
    ///
    /// A zero-variance miss is infinite.
    pub errors: Vec<f64>,
    /// Fraction of errors outside `[-3, 3]`.
    pub outside_three: f64,
    /// Fraction of errors inside `[-1, 1]`.
    pub inside_one: f64,
    /// Skewness of the finite errors.
    pub skewness: f64,
    /// Overall verdict.
    pub verdict: StandardizedVerdict,
}

fn standardize(p: &Prediction, truth: f64) -> f64 {
    let diff = p.expectation - truth;
    if diff == 0.0 {
        0.0
    } else if p.variance > 0.0 {
        diff / p.variance.sqrt()
    } else {
        diff.signum() * f64::INFINITY
    }
}

/// Standardized errors from precomputed predictions.
pub fn standardized_from_predictions(
    output: &str,
    predictions: &[Prediction],
    truths: &[f64],
    tolerance: f64,
) -> StandardizedErrors {
    debug_assert_eq!(predictions.len(), truths.len());
    let errors: Vec<f64> = predictions
        .iter()
        .zip(truths)
        .map(|(p, &t)| standardize(p, t))
        .collect();
    let n = errors.len().max(1) as f64;
    let outside_three = errors.iter().filter(|e| e.abs() > 3.0).count() as f64 / n;
    let inside_one = errors.iter().filter(|e| e.abs() <= 1.0).count() as f64 / n;
    let finite: Vec<f64> = errors.iter().copied().filter(|e| e.is_finite()).collect();
    let skewness = sample_skewness(&finite);

    let verdict = if outside_three > tolerance {
        StandardizedVerdict::Overconfident
    } else if skewness.abs() > MAX_ABS_SKEWNESS {
        StandardizedVerdict::Biased
    } else if !errors.is_empty() && inside_one >= 1.0 - tolerance {
        StandardizedVerdict::Conservative
    } else {
        StandardizedVerdict::Healthy
    };

    StandardizedErrors {
        output: output.to_string(),
        errors,
        outside_three,
        inside_one,
        skewness,
        verdict,
    }
}

/// Run the standardized-error diagnostic for `emulator` on `validation`.
pub fn standardized_errors(
    emulator: &Emulator,
    validation: &TrainingSet,
    tolerance: f64,
) -> Result<StandardizedErrors> {
    let (predictions, truths) = validation_predictions(emulator, validation)?;
    Ok(standardized_from_predictions(
        emulator.output_name(),
        &predictions,
        &truths,
        tolerance,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_predictions(errors: &[f64]) -> (Vec<Prediction>, Vec<f64>) {
        let preds = errors
            .iter()
            .map(|&e| Prediction {
                expectation: e,
                variance: 1.0,
            })
            .collect();
        (preds, vec![0.0; errors.len()])
    }

    #[test]
    fn test_normal_like_errors_are_healthy() {
        let errors = [-2.0, -1.5, -1.2, -0.8, -0.5, -0.2, 0.0, 0.3, 0.6, 0.9, 1.3, 1.6, 2.1, -0.1, 0.1, 1.1, -1.1, 0.4, -0.4, 0.7];
        let (p, t) = unit_predictions(&errors);
        let result = standardized_from_predictions("y", &p, &t, 0.05);
        assert_eq!(result.verdict, StandardizedVerdict::Healthy);
        assert_eq!(result.outside_three, 0.0);
    }

    #[test]
    fn test_large_errors_are_overconfident() {
        let mut errors = vec![0.5; 18];
        errors.extend([5.0, -6.0]);
        let (p, t) = unit_predictions(&errors);
        let result = standardized_from_predictions("y", &p, &t, 0.05);
        assert_eq!(result.verdict, StandardizedVerdict::Overconfident);
        assert!((result.outside_three - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_errors_are_conservative() {
        let errors: Vec<f64> = (0..20).map(|i| (i as f64 - 9.5) * 0.05).collect();
        let (p, t) = unit_predictions(&errors);
        let result = standardized_from_predictions("y", &p, &t, 0.05);
        assert_eq!(result.verdict, StandardizedVerdict::Conservative);
    }

    #[test]
    fn test_one_sided_errors_are_biased() {
        let mut errors = vec![0.1; 17];
        errors.extend([2.5, 2.8, 2.9]);
        let (p, t) = unit_predictions(&errors);
        let result = standardized_from_predictions("y", &p, &t, 0.05);
        assert_eq!(result.verdict, StandardizedVerdict::Biased);
        assert!(result.skewness > 1.0);
    }
}
