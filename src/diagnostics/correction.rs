//! Automated correction of emulators that fail validation.
//!
//! Two steps, in order:
//!
//! 1. **Drop**: an emulator whose comparison diagnostic flags more than
//!    `drop_fraction` of validation points is removed from the set.
//! 2. **Inflate**: every remaining emulator with a classification false
//!    rejection is replaced by `mult_sigma(step^k)` for the smallest `k`
//!    that removes all false rejections, up to `max_inflation_iterations`.
//!
//! Inflation always starts from the fitted emulator, so the result does not
//! depend on how many times correction has been attempted.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::emulator::{Emulator, EmulatorSet};
use crate::error::{Error, Result};
use crate::types::{Target, TargetSet, TrainingSet};

use super::classification::classification_diagnostic;
use super::comparison::comparison_diagnostic;
use super::DiagnosticsConfig;

/// Terminal state of a bounded sigma-inflation loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CorrectionOutcome {
    /// No false rejections remain.
    Converged {
        /// Inflation steps applied (0 if none were needed).
        iterations: usize,
        /// Total sigma multiplier applied.
        factor: f64,
    },
    /// The iteration cap was hit with false rejections left.
    CapExceeded {
        /// Inflation steps applied.
        iterations: usize,
        /// Total sigma multiplier applied.
        factor: f64,
        /// False rejections remaining at the cap.
        remaining: usize,
    },
}

impl CorrectionOutcome {
    /// Whether the loop converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Total sigma multiplier applied.
    pub fn factor(&self) -> f64 {
        match *self {
            Self::Converged { factor, .. } | Self::CapExceeded { factor, .. } => factor,
        }
    }
}

/// Correction applied to one emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorCorrection {
    /// Emulated output.
    pub output: String,
    /// How inflation ended.
    pub outcome: CorrectionOutcome,
}

/// Result of correcting an emulator set.
#[derive(Debug, Clone)]
pub struct CorrectionReport {
    /// Corrected emulators (dropped ones removed).
    pub emulators: EmulatorSet,
    /// Outputs whose emulators were dropped.
    pub dropped: Vec<String>,
    /// Inflation outcome per retained emulator.
    pub corrections: Vec<EmulatorCorrection>,
}

impl CorrectionReport {
    /// Outputs whose inflation hit the cap.
    pub fn unresolved(&self) -> Vec<String> {
        self.corrections
            .iter()
            .filter(|c| !c.outcome.is_converged())
            .map(|c| c.output.clone())
            .collect()
    }

    /// Whether every retained emulator converged.
    pub fn is_converged(&self) -> bool {
        self.corrections.iter().all(|c| c.outcome.is_converged())
    }

    /// Fail with [`Error::MisclassificationUnresolved`] unless converged.
    pub fn require_converged(self) -> Result<Self> {
        let unresolved = self.unresolved();
        if unresolved.is_empty() {
            Ok(self)
        } else {
            Err(Error::MisclassificationUnresolved {
                outputs: unresolved,
            })
        }
    }
}

/// Inflate `emulator` until it has no false rejections on `validation`.
pub fn inflate_until_consistent(
    emulator: &Emulator,
    validation: &TrainingSet,
    target: &Target,
    cutoff: f64,
    config: &DiagnosticsConfig,
) -> Result<(Emulator, CorrectionOutcome)> {
    let mut iterations = 0;
    let mut factor = 1.0;
    let mut candidate = emulator.clone();
    loop {
        let result = classification_diagnostic(&candidate, validation, target, cutoff, 0.0)?;
        if !result.has_false_rejections() {
            return Ok((candidate, CorrectionOutcome::Converged { iterations, factor }));
        }
        if iterations == config.max_inflation_iterations {
            return Ok((
                candidate,
                CorrectionOutcome::CapExceeded {
                    iterations,
                    factor,
                    remaining: result.false_rejections.len(),
                },
            ));
        }
        iterations += 1;
        factor *= config.inflation_step;
        candidate = emulator.mult_sigma(factor);
    }
}

/// Drop unreliable emulators and inflate the rest.
///
/// # Errors
///
/// - [`Error::NoUsableEmulators`] if every emulator is dropped
/// - [`Error::UnknownOutput`] if an emulator has no target or validation column
pub fn correct(
    emulators: &EmulatorSet,
    validation: &TrainingSet,
    targets: &TargetSet,
    cutoff: f64,
    config: &DiagnosticsConfig,
) -> Result<CorrectionReport> {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for emulator in emulators.iter() {
        let comparison = comparison_diagnostic(
            emulator,
            validation,
            config.comparison_sd_multiplier,
            config.tolerance,
        )?;
        if comparison.flagged_fraction() > config.drop_fraction {
            warn!(
                output = emulator.output_name(),
                flagged = comparison.flagged.len(),
                total = comparison.total,
                "dropping emulator failing comparison diagnostic"
            );
            dropped.push(emulator.output_name().to_string());
        } else {
            kept.push(emulator);
        }
    }
    if kept.is_empty() {
        return Err(Error::NoUsableEmulators);
    }

    let mut corrected = Vec::with_capacity(kept.len());
    let mut corrections = Vec::with_capacity(kept.len());
    for emulator in kept {
        let target = targets.require(emulator.output_name())?;
        let (adjusted, outcome) =
            inflate_until_consistent(emulator, validation, target, cutoff, config)?;
        match outcome {
            CorrectionOutcome::Converged { iterations, factor } if iterations > 0 => debug!(
                output = emulator.output_name(),
                iterations,
                factor,
                "inflated emulator sigma"
            ),
            CorrectionOutcome::CapExceeded { remaining, factor, .. } => warn!(
                output = emulator.output_name(),
                remaining,
                factor,
                "sigma inflation hit its cap"
            ),
            _ => {}
        }
        corrections.push(EmulatorCorrection {
            output: emulator.output_name().to_string(),
            outcome,
        });
        corrected.push(adjusted);
    }

    Ok(CorrectionReport {
        emulators: EmulatorSet::new(corrected),
        dropped,
        corrections,
    })
}
