//! Wave-by-wave history matching.
//!
//! ## State machine
//!
//! ```text
//! CollectingTrainingData --fit--> Fitting --> Validating
//!        ^                                      |
//!        |                                  validate
//!     advance                                   v
//!        |                              GeneratingDesign --generate_design--> Advancing
//!        +----------------------------------------------------------------------+
//! ```
//!
//! Any of `validate` and `generate_design` may end in `Terminated` with a
//! [`StopReason`]. Fitting failures return to `CollectingTrainingData` so the
//! caller can add runs.
//!
//! Every completed [`Wave`] stays part of the NROY region: later emulators are
//! only trusted inside the ranges they were trained on.

pub mod simulator;

pub use simulator::{evaluate_points, training_point, Simulator, SimulatorError, SimulatorOutput};

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::design::{latin_hypercube, Design, DesignGenerator};
use crate::diagnostics::{correct, diagnose, CorrectionReport, DiagnosticsReport, EmulatorCorrection};
use crate::emulator::{fit_emulators, EmulatorSet};
use crate::error::{Error, Result};
use crate::implausibility::{ImplausibilityEngine, NroyRegion};
use crate::statistics::mean;
use crate::types::{ParameterSpace, TargetSet, TrainingPoint, TrainingSet};

/// Why a run of waves ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Emulator uncertainty no longer exceeds observation uncertainty.
    DiminishingReturns,
    /// No parameter set survives the combined implausibility filter.
    EmptyNroy,
    /// Enough runs match every target.
    TargetsMatched,
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for simulator runs for the current wave.
    CollectingTrainingData,
    /// Fitting emulators.
    Fitting,
    /// Emulators fit; diagnostics pending.
    Validating,
    /// Wave accepted; next design pending.
    GeneratingDesign,
    /// Design generated; ranges not yet narrowed.
    Advancing,
    /// No further waves.
    Terminated(StopReason),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CollectingTrainingData => write!(f, "collecting training data"),
            Self::Fitting => write!(f, "fitting"),
            Self::Validating => write!(f, "validating"),
            Self::GeneratingDesign => write!(f, "generating design"),
            Self::Advancing => write!(f, "advancing"),
            Self::Terminated(reason) => write!(f, "terminated ({reason:?})"),
        }
    }
}

/// One completed wave.
#[derive(Debug, Clone)]
pub struct Wave {
    /// Position in the sequence, starting at 0.
    pub index: usize,
    /// Ranges the emulators were trained in.
    pub space: ParameterSpace,
    /// Runs used for fitting.
    pub training: TrainingSet,
    /// Runs held out for diagnostics.
    pub validation: TrainingSet,
    /// Emulators after correction.
    pub emulators: EmulatorSet,
    /// Implausibility cutoff for this wave.
    pub cutoff: f64,
    /// Combination order for this wave.
    pub nth: usize,
    /// Diagnostics of the emulators as fit.
    pub diagnostics: DiagnosticsReport,
    /// Outputs whose emulators were dropped.
    pub dropped: Vec<String>,
    /// Sigma inflation applied per retained emulator.
    pub corrections: Vec<EmulatorCorrection>,
    /// Fraction of this wave's runs matching every target.
    pub match_rate: f64,
}

impl Wave {
    /// Mean emulator variance over the validation runs relative to the
    /// observation variance plus model discrepancy, per retained output.
    pub fn uncertainty_ratios(&self, targets: &TargetSet) -> Result<Vec<(String, f64)>> {
        self.emulators
            .iter()
            .map(|emulator| {
                let target = targets.require(emulator.output_name())?;
                let variances: Vec<f64> = self
                    .validation
                    .points()
                    .iter()
                    .map(|p| emulator.variance(p.parameters()))
                    .collect();
                let reference = target.equivalent_variance() + emulator.discrepancy();
                Ok((emulator.output_name().to_string(), mean(&variances) / reference))
            })
            .collect()
    }

    /// Whether every ratio from [`Wave::uncertainty_ratios`] is at most `ratio`.
    pub fn is_diminishing(&self, targets: &TargetSet, ratio: f64) -> Result<bool> {
        Ok(self
            .uncertainty_ratios(targets)?
            .iter()
            .all(|(_, r)| *r <= ratio))
    }
}

#[derive(Debug, Clone)]
struct FittedWave {
    emulators: EmulatorSet,
    training: TrainingSet,
    validation: TrainingSet,
}

#[derive(Debug, Clone)]
struct PendingWave {
    diagnostics: DiagnosticsReport,
    report: CorrectionReport,
}

/// Sequences fitting, validation, design and narrowing across waves.
#[derive(Debug, Clone)]
pub struct WaveOrchestrator {
    config: Config,
    targets: TargetSet,
    initial_space: ParameterSpace,
    space: ParameterSpace,
    phase: Phase,
    runs: Vec<TrainingPoint>,
    failed_runs: usize,
    fitted: Option<FittedWave>,
    pending: Option<PendingWave>,
    design: Option<Design>,
    waves: Vec<Wave>,
}

impl WaveOrchestrator {
    /// Start wave 0 over `space`.
    pub fn new(space: ParameterSpace, targets: TargetSet, config: Config) -> Self {
        Self {
            config,
            targets,
            initial_space: space.clone(),
            space,
            phase: Phase::CollectingTrainingData,
            runs: Vec::new(),
            failed_runs: 0,
            fitted: None,
            pending: None,
            design: None,
            waves: Vec::new(),
        }
    }

    fn require(&self, expected: Phase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                phase: self.phase.to_string(),
                operation,
            })
        }
    }

    /// Current state.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Index of the wave being built.
    pub fn wave_index(&self) -> usize {
        self.waves.len()
    }

    /// Completed waves, oldest first.
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    /// Current parameter ranges.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Ranges at the start of the run.
    pub fn initial_space(&self) -> &ParameterSpace {
        &self.initial_space
    }

    /// Targets being matched.
    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs collected for the current wave.
    pub fn pending_runs(&self) -> &[TrainingPoint] {
        &self.runs
    }

    /// Simulator evaluations dropped in the current wave.
    pub fn failed_runs(&self) -> usize {
        self.failed_runs
    }

    /// Most recent design.
    pub fn design(&self) -> Option<&Design> {
        self.design.as_ref()
    }

    /// Parameter sets to run for the next wave.
    pub fn next_points(&self) -> &[Vec<f64>] {
        self.design.as_ref().map_or(&[], |d| d.points.as_slice())
    }

    /// Latin hypercube over the current ranges, for seeding wave 0.
    pub fn initial_design<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Vec<f64>> {
        latin_hypercube(n, self.space.dim(), rng)
            .iter()
            .map(|u| self.space.from_scaled(u))
            .collect()
    }

    fn check_run(&self, parameters: &[f64]) -> Result<()> {
        self.space.check_dim(parameters)
    }

    /// Add completed runs to the current wave.
    ///
    /// Runs with a non-finite output are dropped. Returns the number kept.
    pub fn submit_runs(&mut self, runs: impl IntoIterator<Item = TrainingPoint>) -> Result<usize> {
        self.require(Phase::CollectingTrainingData, "submit runs")?;
        let mut kept = 0;
        for run in runs {
            self.check_run(run.parameters())?;
            if run.outputs().len() != self.targets.len() {
                return Err(Error::DimensionMismatch {
                    expected: self.targets.len(),
                    actual: run.outputs().len(),
                });
            }
            if run.outputs().iter().all(|v| v.is_finite()) {
                self.runs.push(run);
                kept += 1;
            } else {
                warn!(parameters = ?run.parameters(), "dropping run with non-finite output");
                self.failed_runs += 1;
            }
        }
        Ok(kept)
    }

    /// Add raw simulator results to the current wave.
    ///
    /// Failed or malformed evaluations are dropped. Returns the number kept.
    pub fn submit_evaluations(
        &mut self,
        evaluations: impl IntoIterator<Item = (Vec<f64>, std::result::Result<SimulatorOutput, SimulatorError>)>,
    ) -> Result<usize> {
        self.require(Phase::CollectingTrainingData, "submit evaluations")?;
        let mut kept = 0;
        for (parameters, result) in evaluations {
            self.check_run(&parameters)?;
            let point = result.and_then(|outputs| training_point(parameters.clone(), &outputs, &self.targets));
            match point {
                Ok(point) => {
                    self.runs.push(point);
                    kept += 1;
                }
                Err(error) => {
                    warn!(parameters = ?parameters, %error, "dropping failed simulator run");
                    self.failed_runs += 1;
                }
            }
        }
        Ok(kept)
    }

    /// Minimum runs per wave: enough for a linear basis in both halves.
    pub fn required_runs(&self) -> usize {
        2 * (self.space.dim() + 2)
    }

    /// Split the collected runs and fit one emulator per target.
    ///
    /// # Errors
    ///
    /// - [`Error::InsufficientTrainingData`] with too few runs
    /// - [`Error::Fitting`] if any emulator fails; the orchestrator returns to
    ///   collecting so more runs can be added
    pub fn fit(&mut self) -> Result<&EmulatorSet> {
        self.require(Phase::CollectingTrainingData, "fit")?;
        if self.runs.len() < self.required_runs() {
            return Err(Error::InsufficientTrainingData {
                available: self.runs.len(),
                required: self.required_runs(),
            });
        }
        let all = TrainingSet::for_problem(&self.space, &self.targets, self.runs.clone())?;
        let (training, validation) = all.split_alternating()?;

        self.phase = Phase::Fitting;
        let emulators = match fit_emulators(&training, &self.space, &self.targets, &self.config.emulator) {
            Ok(emulators) => emulators,
            Err(error) => {
                warn!(wave = self.wave_index(), %error, "emulator fitting failed");
                self.phase = Phase::CollectingTrainingData;
                return Err(error);
            }
        };
        info!(
            wave = self.wave_index(),
            training = training.len(),
            validation = validation.len(),
            "wave emulators fit"
        );
        self.phase = Phase::Validating;
        let fitted = self.fitted.insert(FittedWave {
            emulators,
            training,
            validation,
        });
        Ok(&fitted.emulators)
    }

    /// Abandon the current fit and return to collecting runs.
    pub fn discard_fit(&mut self) -> Result<()> {
        self.require(Phase::Validating, "discard fit")?;
        self.fitted = None;
        self.pending = None;
        self.phase = Phase::CollectingTrainingData;
        Ok(())
    }

    /// Run diagnostics and the correction loop, then record the wave.
    ///
    /// # Errors
    ///
    /// - [`Error::NoUsableEmulators`] if every emulator is dropped
    /// - [`Error::MisclassificationUnresolved`] if inflation hits its cap and
    ///   unresolved emulators are not accepted by configuration; call
    ///   [`WaveOrchestrator::accept_unresolved`] to proceed anyway
    pub fn validate(&mut self) -> Result<&Wave> {
        self.require(Phase::Validating, "validate")?;
        let Some(fitted) = &self.fitted else {
            return Err(Error::InvalidTransition {
                phase: self.phase.to_string(),
                operation: "validate",
            });
        };
        let cutoff = self.config.cutoff;
        let diagnostics = diagnose(
            &fitted.emulators,
            &fitted.validation,
            &self.targets,
            cutoff,
            &self.config.diagnostics,
        )?;
        let report = correct(
            &fitted.emulators,
            &fitted.validation,
            &self.targets,
            cutoff,
            &self.config.diagnostics,
        )?;
        let unresolved = report.unresolved();
        self.pending = Some(PendingWave {
            diagnostics,
            report,
        });
        if !unresolved.is_empty() && !self.config.diagnostics.accept_unresolved {
            warn!(wave = self.wave_index(), outputs = ?unresolved, "misclassification unresolved");
            return Err(Error::MisclassificationUnresolved {
                outputs: unresolved,
            });
        }
        self.commit_wave()
    }

    /// Record the wave despite unresolved misclassification.
    pub fn accept_unresolved(&mut self) -> Result<&Wave> {
        self.require(Phase::Validating, "accept unresolved emulators")?;
        if self.pending.is_none() {
            return Err(Error::InvalidTransition {
                phase: self.phase.to_string(),
                operation: "accept unresolved emulators before validating",
            });
        }
        self.commit_wave()
    }

    fn commit_wave(&mut self) -> Result<&Wave> {
        let (Some(fitted), Some(pending)) = (self.fitted.take(), self.pending.take()) else {
            return Err(Error::InvalidTransition {
                phase: self.phase.to_string(),
                operation: "record wave",
            });
        };
        let all = TrainingSet::for_problem(&self.space, &self.targets, self.runs.clone())?;
        let match_rate = all.match_rate(&self.targets, self.config.cutoff)?;
        let wave = Wave {
            index: self.waves.len(),
            space: self.space.clone(),
            training: fitted.training,
            validation: fitted.validation,
            emulators: pending.report.emulators,
            cutoff: self.config.cutoff,
            nth: self.config.nth,
            diagnostics: pending.diagnostics,
            dropped: pending.report.dropped,
            corrections: pending.report.corrections,
            match_rate,
        };

        let matched = self
            .config
            .match_rate_stop
            .is_some_and(|stop| match_rate >= stop);
        let diminishing = self.config.stop_on_diminishing_returns
            && wave.is_diminishing(&self.targets, self.config.uncertainty_ratio)?;
        self.phase = if matched {
            Phase::Terminated(StopReason::TargetsMatched)
        } else if diminishing {
            Phase::Terminated(StopReason::DiminishingReturns)
        } else {
            Phase::GeneratingDesign
        };
        info!(
            wave = wave.index,
            emulators = wave.emulators.len(),
            dropped = wave.dropped.len(),
            match_rate,
            phase = %self.phase,
            "wave validated"
        );
        self.waves.push(wave);
        Ok(&self.waves[self.waves.len() - 1])
    }

    /// NROY region defined by every completed wave.
    pub fn nroy_region(&self) -> Result<NroyRegion<'_>> {
        self.waves.iter().try_fold(NroyRegion::new(), |region, wave| {
            let engine = ImplausibilityEngine::new(&wave.emulators, &self.targets)?
                .cutoff(wave.cutoff)
                .nth(wave.nth);
            Ok(region.with_layer(engine, Some(&wave.space)))
        })
    }

    /// Monte-Carlo fraction of the initial space still inside NROY.
    pub fn volume_fraction<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        Ok(self
            .nroy_region()?
            .volume_fraction(&self.initial_space, self.config.volume_samples, rng))
    }

    /// Generate the next wave's design inside the NROY region.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyNroy`] if no point is found; the orchestrator terminates.
    pub fn generate_design<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&Design> {
        self.require(Phase::GeneratingDesign, "generate design")?;
        let design = {
            let region = self.nroy_region()?;
            DesignGenerator::new(&region, &self.space, self.config.design.clone())
                .generate(self.config.design_points, rng)
        };
        let wave = self.waves.len().saturating_sub(1);
        if design.is_empty() {
            warn!(wave, evaluations = design.evaluations, "NROY region is empty");
            self.phase = Phase::Terminated(StopReason::EmptyNroy);
            return Err(Error::EmptyNroy { wave });
        }
        info!(
            wave,
            points = design.len(),
            requested = design.requested,
            "design generated"
        );
        self.phase = Phase::Advancing;
        Ok(self.design.insert(design))
    }

    /// Narrow the ranges to the design and start collecting the next wave.
    pub fn advance(&mut self) -> Result<&ParameterSpace> {
        self.require(Phase::Advancing, "advance")?;
        let Some(design) = &self.design else {
            return Err(Error::InvalidTransition {
                phase: self.phase.to_string(),
                operation: "advance without a design",
            });
        };
        let narrowed = self.space.narrowed_to(&design.points, self.config.range_margin)?;
        self.space.check_narrowing(&narrowed)?;
        info!(
            wave = self.waves.len(),
            ranges = ?narrowed
                .parameters()
                .iter()
                .map(|p| (p.range.lower, p.range.upper))
                .collect::<Vec<_>>(),
            "advancing to next wave"
        );
        self.space = narrowed;
        self.runs.clear();
        self.failed_runs = 0;
        self.phase = Phase::CollectingTrainingData;
        Ok(&self.space)
    }

    /// Evaluate `points`, then fit, validate, design and advance.
    ///
    /// Returns the phase reached: `CollectingTrainingData` for the next wave,
    /// or `Terminated`.
    pub fn run_wave<S, R>(&mut self, simulator: &S, points: &[Vec<f64>], rng: &mut R) -> Result<Phase>
    where
        S: Simulator + ?Sized,
        R: Rng + ?Sized,
    {
        self.require(Phase::CollectingTrainingData, "run wave")?;
        let kept = self.submit_evaluations(evaluate_points(simulator, points))?;
        info!(
            wave = self.wave_index(),
            submitted = points.len(),
            kept,
            "simulator runs collected"
        );
        self.fit()?;
        self.validate()?;
        if let Phase::Terminated(_) = self.phase {
            return Ok(self.phase);
        }
        self.generate_design(rng)?;
        self.advance()?;
        Ok(self.phase)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;
    use crate::test_support::{toy_outputs, toy_targets, unit_square};

    fn toy_simulator(x: &[f64]) -> std::result::Result<SimulatorOutput, SimulatorError> {
        let y = toy_outputs(x);
        Ok([("f1".to_string(), y[0]), ("f2".to_string(), y[1])]
            .into_iter()
            .collect())
    }

    fn orchestrator() -> WaveOrchestrator {
        let config = Config::quick()
            .match_rate_stop(None)
            .stop_on_diminishing_returns(false)
            .diagnostics(crate::diagnostics::DiagnosticsConfig::default().accept_unresolved(true).drop_fraction(1.0));
        WaveOrchestrator::new(unit_square(), toy_targets(), config)
    }

    #[test]
    fn test_out_of_order_operations_rejected() {
        let mut orch = orchestrator();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!(matches!(
            orch.validate(),
            Err(Error::InvalidTransition { operation: "validate", .. })
        ));
        assert!(matches!(
            orch.generate_design(&mut rng),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(orch.advance(), Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_insufficient_runs() {
        let mut orch = orchestrator();
        let points = vec![vec![0.1, 0.2], vec![0.5, 0.5]];
        orch.submit_evaluations(evaluate_points(&toy_simulator, &points)).unwrap();
        assert_eq!(
            orch.fit().unwrap_err(),
            Error::InsufficientTrainingData {
                available: 2,
                required: 8
            }
        );
        assert_eq!(orch.phase(), Phase::CollectingTrainingData);
    }

    #[test]
    fn test_failed_evaluations_are_dropped() {
        let mut orch = orchestrator();
        let evaluations = vec![
            (vec![0.1, 0.2], toy_simulator(&[0.1, 0.2])),
            (vec![0.3, 0.4], Err(SimulatorError::Failed("diverged".into()))),
            (
                vec![0.5, 0.6],
                Ok([("f1".to_string(), 1.0)].into_iter().collect()),
            ),
        ];
        assert_eq!(orch.submit_evaluations(evaluations).unwrap(), 1);
        assert_eq!(orch.failed_runs(), 2);
        assert_eq!(orch.pending_runs().len(), 1);
    }

    #[test]
    fn test_single_wave_narrows_space() {
        let mut orch = orchestrator();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let points = orch.initial_design(30, &mut rng);
        let phase = orch.run_wave(&toy_simulator, &points, &mut rng).unwrap();
        assert_eq!(phase, Phase::CollectingTrainingData);
        assert_eq!(orch.waves().len(), 1);
        assert!(!orch.next_points().is_empty());
        orch.initial_space().check_narrowing(orch.space()).unwrap();
        let region = orch.nroy_region().unwrap();
        assert_eq!(region.depth(), 1);
        assert!(orch.next_points().iter().all(|p| region.contains(p)));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::CollectingTrainingData.to_string(), "collecting training data");
        assert_eq!(
            Phase::Terminated(StopReason::EmptyNroy).to_string(),
            "terminated (EmptyNroy)"
        );
    }
}
