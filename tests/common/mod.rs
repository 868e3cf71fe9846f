//! Shared fixtures for integration tests.

#![allow(dead_code)]

use nroy::{
    fit_emulators, EmulatorOptions, EmulatorSet, ParameterSpace, SimulatorError, SimulatorOutput,
    Target, TargetSet, TrainingPoint, TrainingSet,
};

/// Parameter values that produced the observed targets.
pub const TRUTH: [f64; 2] = [0.4, 0.6];

pub fn space() -> ParameterSpace {
    ParameterSpace::new([("a", 0.0, 1.0), ("b", 0.0, 1.0)]).unwrap()
}

/// Smooth two-output analytic model on the unit square.
pub fn model(x: &[f64]) -> [f64; 2] {
    let (a, b) = (x[0], x[1]);
    [
        (3.0 * a).sin() + 2.0 * b * b,
        4.0 * a * b + 0.5 * (2.0 * b).cos(),
    ]
}

pub fn simulator(x: &[f64]) -> Result<SimulatorOutput, SimulatorError> {
    let [f1, f2] = model(x);
    Ok([("f1".to_string(), f1), ("f2".to_string(), f2)]
        .into_iter()
        .collect())
}

pub fn targets() -> TargetSet {
    let [f1, f2] = model(&TRUTH);
    TargetSet::new([
        ("f1", Target::observation(f1, 0.05)),
        ("f2", Target::observation(f2, 0.05)),
    ])
    .unwrap()
}

/// Halton points in `[0, 1]^2` (bases 2 and 3) from sequence index `start`.
pub fn halton(start: usize, n: usize) -> Vec<Vec<f64>> {
    (start..start + n)
        .map(|i| {
            [2usize, 3]
                .iter()
                .map(|&base| {
                    let (mut f, mut r, mut k) = (1.0, 0.0, i);
                    while k > 0 {
                        f /= base as f64;
                        r += f * (k % base) as f64;
                        k /= base;
                    }
                    r
                })
                .collect()
        })
        .collect()
}

pub fn runs(start: usize, n: usize) -> TrainingSet {
    let points = halton(start, n)
        .into_iter()
        .map(|x| {
            let y = model(&x).to_vec();
            TrainingPoint::new(x, y)
        })
        .collect();
    TrainingSet::for_problem(&space(), &targets(), points).unwrap()
}

pub fn fitted(n: usize) -> EmulatorSet {
    fit_emulators(&runs(1, n), &space(), &targets(), &EmulatorOptions::default()).unwrap()
}
