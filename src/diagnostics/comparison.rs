//! Comparison diagnostic: is the simulator output inside the emulator's
//! credible band?
//!
//! A validation point is flagged when
//!
//! ```text
//! |E[f(x)] - f(x)| > k * sqrt(Var[f(x)])
//! ```
//!
//! with `k = 3` by default. A well-calibrated emulator flags at most a few
//! percent of points; more indicates overconfidence.

use serde::{Deserialize, Serialize};

use crate::emulator::{Emulator, Prediction};
use crate::error::Result;
use crate::types::TrainingSet;

use super::validation_predictions;

/// Outcome of the comparison diagnostic for one emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Emulated output.
    pub output: String,
    /// Indices of flagged validation points.
    pub flagged: Vec<usize>,
    /// Number of validation points.
    pub total: usize,
    /// Largest acceptable flagged fraction.
    pub tolerance: f64,
}

impl ComparisonResult {
    /// Fraction of validation points flagged.
    pub fn flagged_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.flagged.len() as f64 / self.total as f64
        }
    }

    /// Whether the flagged fraction is within tolerance.
    pub fn passed(&self) -> bool {
        self.flagged_fraction() <= self.tolerance
    }
}

/// Whether a single prediction misses the truth by more than `sd_multiplier`
/// standard deviations.
pub fn is_flagged(prediction: &Prediction, truth: f64, sd_multiplier: f64) -> bool {
    (prediction.expectation - truth).abs() > sd_multiplier * prediction.variance.max(0.0).sqrt()
}

/// Comparison diagnostic from precomputed predictions.
pub fn comparison_from_predictions(
    output: &str,
    predictions: &[Prediction],
    truths: &[f64],
    sd_multiplier: f64,
    tolerance: f64,
) -> ComparisonResult {
    debug_assert_eq!(predictions.len(), truths.len());
    let flagged = predictions
        .iter()
        .zip(truths)
        .enumerate()
        .filter(|(_, (p, &t))| is_flagged(p, t, sd_multiplier))
        .map(|(i, _)| i)
        .collect();
    ComparisonResult {
        output: output.to_string(),
        flagged,
        total: predictions.len(),
        tolerance,
    }
}

/// Run the comparison diagnostic for `emulator` on `validation`.
pub fn comparison_diagnostic(
    emulator: &Emulator,
    validation: &TrainingSet,
    sd_multiplier: f64,
    tolerance: f64,
) -> Result<ComparisonResult> {
    let (predictions, truths) = validation_predictions(emulator, validation)?;
    Ok(comparison_from_predictions(
        emulator.output_name(),
        &predictions,
        &truths,
        sd_multiplier,
        tolerance,
    ))
}
