//! Validation of emulators against held-out simulator runs.
//!
//! Three independent checks per emulator:
//!
//! - [`comparison`]: is the truth within `k` standard deviations?
//! - [`classification`]: does the emulator rule out points the simulator
//!   keeps (false rejections)?
//! - [`standardized`]: is the distribution of standardized errors roughly
//!   standard normal?
//!
//! [`correction`] drives the automated drop-and-inflate loop run between
//! waves.

pub mod classification;
pub mod comparison;
pub mod correction;
pub mod standardized;

pub use classification::{classification_diagnostic, ClassificationResult};
pub use comparison::{comparison_diagnostic, ComparisonResult};
pub use correction::{correct, inflate_until_consistent, CorrectionOutcome, CorrectionReport, EmulatorCorrection};
pub use standardized::{standardized_errors, StandardizedErrors, StandardizedVerdict};

use serde::{Deserialize, Serialize};

use crate::constants::{
    COMPARISON_SD_MULTIPLIER, DIAGNOSTIC_TOLERANCE, DROP_FRACTION, MAX_INFLATION_ITERATIONS,
    SIGMA_INFLATION_STEP,
};
use crate::emulator::{Emulator, EmulatorSet, Prediction};
use crate::error::Result;
use crate::types::{TargetSet, TrainingSet};

/// Thresholds used by the diagnostics and the correction loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Standard deviations allowed by the comparison diagnostic.
    ///
    /// Default: 3.0
    pub comparison_sd_multiplier: f64,

    /// Largest acceptable fraction of flagged points for a diagnostic to pass.
    ///
    /// Default: 0.05
    pub tolerance: f64,

    /// Comparison-failure fraction above which an emulator is dropped.
    ///
    /// Default: 0.10
    pub drop_fraction: f64,

    /// Sigma multiplier applied per inflation step.
    ///
    /// Default: 1.1
    pub inflation_step: f64,

    /// Inflation steps allowed before reporting the emulator unresolved.
    ///
    /// Default: 50
    pub max_inflation_iterations: usize,

    /// Proceed with emulators whose inflation hit the cap instead of failing
    /// with [`crate::Error::MisclassificationUnresolved`].
    ///
    /// Default: false
    pub accept_unresolved: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            comparison_sd_multiplier: COMPARISON_SD_MULTIPLIER,
            tolerance: DIAGNOSTIC_TOLERANCE,
            drop_fraction: DROP_FRACTION,
            inflation_step: SIGMA_INFLATION_STEP,
            max_inflation_iterations: MAX_INFLATION_ITERATIONS,
            accept_unresolved: false,
        }
    }
}

impl DiagnosticsConfig {
    /// Set the comparison diagnostic's standard-deviation multiplier.
    pub fn comparison_sd_multiplier(mut self, k: f64) -> Self {
        assert!(k > 0.0, "comparison_sd_multiplier must be > 0");
        self.comparison_sd_multiplier = k;
        self
    }

    /// Set the acceptable flagged fraction.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&tolerance),
            "tolerance must be in [0, 1]"
        );
        self.tolerance = tolerance;
        self
    }

    /// Set the comparison-failure fraction that drops an emulator.
    pub fn drop_fraction(mut self, fraction: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&fraction),
            "drop_fraction must be in [0, 1]"
        );
        self.drop_fraction = fraction;
        self
    }

    /// Set the per-step sigma inflation factor.
    pub fn inflation_step(mut self, step: f64) -> Self {
        assert!(
            step > 1.0 && step.is_finite(),
            "inflation_step must be > 1"
        );
        self.inflation_step = step;
        self
    }

    /// Set the inflation iteration cap.
    pub fn max_inflation_iterations(mut self, cap: usize) -> Self {
        self.max_inflation_iterations = cap;
        self
    }

    /// Accept emulators that remain misclassifying after the cap.
    pub fn accept_unresolved(mut self, accept: bool) -> Self {
        self.accept_unresolved = accept;
        self
    }
}

/// All three diagnostics for one emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorDiagnostics {
    /// Comparison diagnostic.
    pub comparison: ComparisonResult,
    /// Classification diagnostic.
    pub classification: ClassificationResult,
    /// Standardized-error diagnostic.
    pub standardized: StandardizedErrors,
}

impl EmulatorDiagnostics {
    /// Emulated output.
    pub fn output(&self) -> &str {
        &self.comparison.output
    }

    /// Whether comparison and classification both pass and the standardized
    /// errors are not overconfident.
    pub fn passed(&self) -> bool {
        self.comparison.passed()
            && self.classification.passed()
            && self.standardized.verdict != StandardizedVerdict::Overconfident
    }
}

/// Diagnostics for a whole emulator set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Per-emulator results, in emulator order.
    pub emulators: Vec<EmulatorDiagnostics>,
}

impl DiagnosticsReport {
    /// Whether every emulator passed.
    pub fn passed(&self) -> bool {
        self.emulators.iter().all(EmulatorDiagnostics::passed)
    }

    /// Outputs whose emulators failed at least one check.
    pub fn failing(&self) -> Vec<&str> {
        self.emulators
            .iter()
            .filter(|d| !d.passed())
            .map(EmulatorDiagnostics::output)
            .collect()
    }

    /// Diagnostics for one output.
    pub fn get(&self, output: &str) -> Option<&EmulatorDiagnostics> {
        self.emulators.iter().find(|d| d.output() == output)
    }
}

/// Predictions and true outputs of `emulator` at every validation run.
pub(crate) fn validation_predictions(
    emulator: &Emulator,
    validation: &TrainingSet,
) -> Result<(Vec<Prediction>, Vec<f64>)> {
    let truths = validation.output_column(emulator.output_name())?;
    let predictions = validation
        .points()
        .iter()
        .map(|p| emulator.predict(p.parameters()))
        .collect();
    Ok((predictions, truths))
}

/// Run all three diagnostics for every emulator in the set.
pub fn diagnose(
    emulators: &EmulatorSet,
    validation: &TrainingSet,
    targets: &TargetSet,
    cutoff: f64,
    config: &DiagnosticsConfig,
) -> Result<DiagnosticsReport> {
    let emulators = emulators
        .iter()
        .map(|emulator| {
            let target = targets.require(emulator.output_name())?;
            let (predictions, truths) = validation_predictions(emulator, validation)?;
            let output = emulator.output_name();
            Ok(EmulatorDiagnostics {
                comparison: comparison::comparison_from_predictions(
                    output,
                    &predictions,
                    &truths,
                    config.comparison_sd_multiplier,
                    config.tolerance,
                ),
                classification: classification::classification_from_predictions(
                    output,
                    &predictions,
                    &truths,
                    target,
                    emulator.discrepancy(),
                    cutoff,
                    config.tolerance,
                ),
                standardized: standardized::standardized_from_predictions(
                    output,
                    &predictions,
                    &truths,
                    config.tolerance,
                ),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DiagnosticsReport { emulators })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{fit_emulators, EmulatorOptions};
    use crate::test_support::{toy_targets, toy_training_set, unit_square};

    #[test]
    fn test_default_config() {
        let config = DiagnosticsConfig::default();
        assert_eq!(config.comparison_sd_multiplier, 3.0);
        assert_eq!(config.tolerance, 0.05);
        assert_eq!(config.drop_fraction, 0.10);
        assert_eq!(config.max_inflation_iterations, 50);
        assert!(!config.accept_unresolved);
    }

    #[test]
    #[should_panic(expected = "inflation_step must be > 1")]
    fn test_inflation_step_validation() {
        let _ = DiagnosticsConfig::default().inflation_step(1.0);
    }

    #[test]
    fn test_diagnose_reports_every_emulator() {
        let space = unit_square();
        let training = toy_training_set(&space, 30, 1);
        let validation = toy_training_set(&space, 20, 101);
        let targets = toy_targets();
        let set = fit_emulators(&training, &space, &targets, &EmulatorOptions::default()).unwrap();
        let report = diagnose(&set, &validation, &targets, 3.0, &DiagnosticsConfig::default()).unwrap();
        assert_eq!(report.emulators.len(), 2);
        for d in &report.emulators {
            assert_eq!(d.comparison.total, 20);
            assert_eq!(d.standardized.errors.len(), 20);
            assert_eq!(
                d.classification.agreements
                    + d.classification.false_rejections.len()
                    + d.classification.conservative.len(),
                20
            );
        }
        assert!(report.get("f2").is_some());
        assert!(report.get("nope").is_none());
    }
}
