//! Bayes-linear emulators of simulator outputs.
//!
//! One [`Emulator`] is fit per output:
//!
//! 1. **Regression** ([`basis`]): polynomial basis over active parameters,
//!    chosen by term significance
//! 2. **Correlation** ([`correlation`]): stationary kernel over the residuals
//! 3. **Hyperparameters** ([`hyperparameters`]): pluggable estimation of the
//!    correlation length and nugget
//! 4. **Adjustment** ([`model`]): closed-form Bayes-linear update at query time
//!
//! [`fit_emulators`] fits every output of a target set, in parallel when the
//! `parallel` feature is enabled. Fitting output `i` never touches output `j`.

pub mod basis;
pub mod correlation;
pub mod hyperparameters;
pub mod model;

pub use basis::{BasisFunction, RegressionBasis};
pub use correlation::{Correlation, Kernel};
pub use hyperparameters::{
    FixedHyperparameters, HyperparameterProblem, HyperparameterStrategy, Hyperparameters,
    LikelihoodGrid,
};
pub use model::{Emulator, EmulatorOptions, Prediction};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::types::{ParameterSpace, TargetSet, TrainingSet};

/// Homogeneous, name-addressable collection of emulators.
#[derive(Debug, Clone, Default)]
pub struct EmulatorSet {
    emulators: Vec<Emulator>,
}

impl EmulatorSet {
    /// Wrap a list of emulators.
    pub fn new(emulators: Vec<Emulator>) -> Self {
        Self { emulators }
    }

    /// Number of emulators.
    pub fn len(&self) -> usize {
        self.emulators.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.emulators.is_empty()
    }

    /// Emulators in order.
    pub fn iter(&self) -> impl Iterator<Item = &Emulator> {
        self.emulators.iter()
    }

    /// Emulators as a slice.
    pub fn as_slice(&self) -> &[Emulator] {
        &self.emulators
    }

    /// Emulator for an output.
    pub fn get(&self, output: &str) -> Option<&Emulator> {
        self.emulators.iter().find(|e| e.output_name() == output)
    }

    /// Output names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.emulators.iter().map(Emulator::output_name)
    }

    /// Add an emulator, replacing any existing one for the same output.
    pub fn insert(&mut self, emulator: Emulator) {
        match self
            .emulators
            .iter_mut()
            .find(|e| e.output_name() == emulator.output_name())
        {
            Some(slot) => *slot = emulator,
            None => self.emulators.push(emulator),
        }
    }

    /// Remove and return the emulator for an output.
    pub fn remove(&mut self, output: &str) -> Option<Emulator> {
        let idx = self.emulators.iter().position(|e| e.output_name() == output)?;
        Some(self.emulators.remove(idx))
    }

    /// Unwrap into the underlying list.
    pub fn into_vec(self) -> Vec<Emulator> {
        self.emulators
    }
}

impl FromIterator<Emulator> for EmulatorSet {
    fn from_iter<I: IntoIterator<Item = Emulator>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Fit one emulator per target output.
///
/// The whole set fails if any output fails to fit: the caller must supply
/// more or better-spread runs.
pub fn fit_emulators(
    training: &TrainingSet,
    domain: &ParameterSpace,
    targets: &TargetSet,
    options: &EmulatorOptions,
) -> Result<EmulatorSet> {
    let names: Vec<&str> = targets.names().collect();

    #[cfg(feature = "parallel")]
    let fitted: Vec<Result<Emulator>> = names
        .par_iter()
        .map(|name| Emulator::fit(training, name, domain, options))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let fitted: Vec<Result<Emulator>> = names
        .iter()
        .map(|name| Emulator::fit(training, name, domain, options))
        .collect();

    let set: EmulatorSet = fitted.into_iter().collect::<Result<Vec<_>>>()?.into_iter().collect();
    info!(
        outputs = set.len(),
        runs = training.len(),
        "fitted emulator set"
    );
    Ok(set)
}
