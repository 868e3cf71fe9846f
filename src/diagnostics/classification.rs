//! Classification diagnostic: does the emulator rule out points the
//! simulator itself would keep?
//!
//! Each validation point is classified twice, once from the emulator and once
//! from the true simulator output (emulator variance replaced by 0):
//!
//! ```text
//!                      model non-implausible   model implausible
//! emulator non-impl.   agree                   conservative (fine)
//! emulator implaus.    FALSE REJECTION         agree
//! ```
//!
//! False rejections shrink the NROY region incorrectly and must be removed.

use serde::{Deserialize, Serialize};

use crate::emulator::{Emulator, Prediction};
use crate::error::Result;
use crate::implausibility::{classify, implausibility_from_moments, model_implausibility, Classification};
use crate::types::{Target, TrainingSet};

use super::validation_predictions;

/// Outcome of the classification diagnostic for one emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Emulated output.
    pub output: String,
    /// Points the emulator rules out but the simulator keeps.
    pub false_rejections: Vec<usize>,
    /// Points the emulator keeps but the simulator rules out.
    pub conservative: Vec<usize>,
    /// Points on which both agree.
    pub agreements: usize,
    /// Number of validation points.
    pub total: usize,
    /// Largest acceptable false-rejection fraction.
    pub tolerance: f64,
}

impl ClassificationResult {
    /// Fraction of validation points falsely rejected.
    pub fn false_rejection_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.false_rejections.len() as f64 / self.total as f64
        }
    }

    /// Whether any false rejection occurred.
    pub fn has_false_rejections(&self) -> bool {
        !self.false_rejections.is_empty()
    }

    /// Whether the false-rejection fraction is within tolerance.
    pub fn passed(&self) -> bool {
        self.false_rejection_fraction() <= self.tolerance
    }
}

/// Classification diagnostic from precomputed predictions.
pub fn classification_from_predictions(
    output: &str,
    predictions: &[Prediction],
    truths: &[f64],
    target: &Target,
    discrepancy: f64,
    cutoff: f64,
    tolerance: f64,
) -> ClassificationResult {
    debug_assert_eq!(predictions.len(), truths.len());
    let mut false_rejections = Vec::new();
    let mut conservative = Vec::new();
    let mut agreements = 0;
    for (i, (p, &truth)) in predictions.iter().zip(truths).enumerate() {
        let emulated = classify(
            implausibility_from_moments(p.expectation, p.variance, target, discrepancy),
            cutoff,
        );
        let actual = classify(model_implausibility(truth, target, discrepancy), cutoff);
        match (emulated, actual) {
            (Classification::Implausible, Classification::NonImplausible) => {
                false_rejections.push(i)
            }
            (Classification::NonImplausible, Classification::Implausible) => conservative.push(i),
            _ => agreements += 1,
        }
    }
    ClassificationResult {
        output: output.to_string(),
        false_rejections,
        conservative,
        agreements,
        total: predictions.len(),
        tolerance,
    }
}

/// Run the classification diagnostic for `emulator` on `validation`.
pub fn classification_diagnostic(
    emulator: &Emulator,
    validation: &TrainingSet,
    target: &Target,
    cutoff: f64,
    tolerance: f64,
) -> Result<ClassificationResult> {
    let (predictions, truths) = validation_predictions(emulator, validation)?;
    Ok(classification_from_predictions(
        emulator.output_name(),
        &predictions,
        &truths,
        target,
        emulator.discrepancy(),
        cutoff,
        tolerance,
    ))
}
