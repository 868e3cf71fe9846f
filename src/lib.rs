//! # nroy
//!
//! Bayes-linear emulation and history matching for expensive deterministic
//! simulators.
//!
//! Given parameter ranges, observed targets and a slow simulator, this crate:
//! - Fits one fast statistical surrogate (emulator) per simulator output
//! - Scores parameter sets by implausibility against the targets
//! - Validates emulators on held-out runs and corrects overconfident ones
//! - Generates new runs inside the region not yet ruled out (NROY)
//! - Narrows the ranges wave by wave
//!
//! ## Quick Start
//!
//! ```ignore
//! use nroy::{Config, ParameterSpace, Target, TargetSet, WaveOrchestrator, Phase};
//!
//! let space = ParameterSpace::new([("beta", 0.1, 1.0), ("gamma", 0.05, 0.5)])?;
//! let targets = TargetSet::new([
//!     ("peak", Target::observation(420.0, 20.0)),
//!     ("final", Target::interval(800.0, 900.0)),
//! ])?;
//! let config = Config::default();
//! let mut rng = config.rng();
//! let mut waves = WaveOrchestrator::new(space, targets, config);
//!
//! let mut points = waves.initial_design(40, &mut rng);
//! while waves.run_wave(&my_simulator, &points, &mut rng)? == Phase::CollectingTrainingData {
//!     points = waves.next_points().to_vec();
//! }
//! ```
//!
//! ## Randomness
//!
//! Every stochastic operation takes an explicit `&mut impl Rng`. With the same
//! seed and inputs, designs are reproducible.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod constants;
mod error;
mod types;

// Functional modules
pub mod design;
pub mod diagnostics;
pub mod emulator;
pub mod implausibility;
pub mod statistics;
pub mod wave;

#[cfg(test)]
mod test_support;

// Re-exports for public API
pub use config::Config;
pub use constants::{DEFAULT_CUTOFF, DEFAULT_SEED};
pub use design::{generate_design, Design, DesignConfig, DesignGenerator};
pub use diagnostics::{
    correct, diagnose, CorrectionOutcome, CorrectionReport, DiagnosticsConfig, DiagnosticsReport,
    StandardizedVerdict,
};
pub use emulator::{
    fit_emulators, Emulator, EmulatorOptions, EmulatorSet, HyperparameterStrategy, Kernel,
    Prediction,
};
pub use error::{Error, FittingFailure, Result};
pub use implausibility::{
    classify, combined_implausibility, implausibility, nth_maximum, Classification,
    ImplausibilityEngine, NroyRegion,
};
pub use types::{
    NamedTarget, Parameter, ParameterRange, ParameterSpace, Target, TargetSet, TrainingPoint,
    TrainingSet,
};
pub use wave::{Phase, Simulator, SimulatorError, SimulatorOutput, StopReason, Wave, WaveOrchestrator};
