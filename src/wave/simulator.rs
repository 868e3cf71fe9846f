//! Boundary to the external simulator.
//!
//! The simulator is opaque: a pure function from a parameter set to named
//! outputs. Failed or malformed evaluations never become training points.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{TargetSet, TrainingPoint};

/// A simulator evaluation that cannot be used for training.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    /// The simulator reported a failure.
    #[error("simulator failed: {0}")]
    Failed(String),

    /// A target output is absent from the result.
    #[error("simulator result is missing output '{0}'")]
    MissingOutput(String),

    /// A target output is NaN or infinite.
    #[error("simulator output '{name}' is not finite ({value})")]
    NonFinite {
        /// Output name.
        name: String,
        /// Offending value.
        value: f64,
    },
}

/// Outputs of one simulator evaluation, keyed by name.
pub type SimulatorOutput = HashMap<String, f64>;

/// An expensive deterministic model.
///
/// Implemented for any `Fn(&[f64]) -> Result<SimulatorOutput, SimulatorError>`.
pub trait Simulator {
    /// Evaluate at one parameter set (original units).
    fn evaluate(&self, parameters: &[f64]) -> Result<SimulatorOutput, SimulatorError>;
}

impl<F> Simulator for F
where
    F: Fn(&[f64]) -> Result<SimulatorOutput, SimulatorError>,
{
    fn evaluate(&self, parameters: &[f64]) -> Result<SimulatorOutput, SimulatorError> {
        self(parameters)
    }
}

/// Order a simulator result by target name, rejecting missing or non-finite
/// outputs. Extra outputs are ignored.
pub fn training_point(
    parameters: Vec<f64>,
    outputs: &SimulatorOutput,
    targets: &TargetSet,
) -> Result<TrainingPoint, SimulatorError> {
    let values = targets
        .names()
        .map(|name| match outputs.get(name) {
            None => Err(SimulatorError::MissingOutput(name.to_string())),
            Some(&value) if !value.is_finite() => Err(SimulatorError::NonFinite {
                name: name.to_string(),
                value,
            }),
            Some(&value) => Ok(value),
        })
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(TrainingPoint::new(parameters, values))
}

/// Evaluate `simulator` at every point, in order.
///
/// Runs are sequential; distributing simulator work is left to the caller.
pub fn evaluate_points<S: Simulator + ?Sized>(
    simulator: &S,
    points: &[Vec<f64>],
) -> Vec<(Vec<f64>, Result<SimulatorOutput, SimulatorError>)> {
    points
        .iter()
        .map(|p| (p.clone(), simulator.evaluate(p)))
        .collect()
}
