//! Shared fixtures for unit tests.

use crate::types::{ParameterSpace, Target, TargetSet, TrainingPoint, TrainingSet};

/// Halton points in `[-1, 1]^dim` (bases 2, 3, 5, 7, 11, 13).
pub(crate) fn halton_points(n: usize, dim: usize) -> Vec<Vec<f64>> {
    halton_points_from(1, n, dim)
}

/// Halton points starting at sequence index `start`.
pub(crate) fn halton_points_from(start: usize, n: usize, dim: usize) -> Vec<Vec<f64>> {
    const PRIMES: [usize; 6] = [2, 3, 5, 7, 11, 13];
    (start..start + n)
        .map(|i| {
            PRIMES[..dim]
                .iter()
                .map(|&base| {
                    let (mut f, mut r, mut k) = (1.0, 0.0, i);
                    while k > 0 {
                        f /= base as f64;
                        r += f * (k % base) as f64;
                        k /= base;
                    }
                    2.0 * r - 1.0
                })
                .collect()
        })
        .collect()
}

/// Two-parameter unit square `[0, 1]^2` named `a`, `b`.
pub(crate) fn unit_square() -> ParameterSpace {
    ParameterSpace::new([("a", 0.0, 1.0), ("b", 0.0, 1.0)]).unwrap()
}

/// Smooth two-output toy simulator on the unit square.
pub(crate) fn toy_outputs(x: &[f64]) -> Vec<f64> {
    let (a, b) = (x[0], x[1]);
    vec![
        (3.0 * a).sin() + 2.0 * b * b,
        4.0 * a * b + 0.5 * (2.0 * b).cos(),
    ]
}

/// Targets for [`toy_outputs`] centred on the point `(0.4, 0.6)`.
pub(crate) fn toy_targets() -> TargetSet {
    let truth = toy_outputs(&[0.4, 0.6]);
    TargetSet::new([
        ("f1", Target::observation(truth[0], 0.05)),
        ("f2", Target::observation(truth[1], 0.05)),
    ])
    .unwrap()
}

/// Evaluate [`toy_outputs`] on Halton points mapped into `space`.
pub(crate) fn toy_training_set(space: &ParameterSpace, n: usize, start: usize) -> TrainingSet {
    let points = halton_points_from(start, n, space.dim())
        .into_iter()
        .map(|u| {
            let x = space.from_scaled(&u);
            let y = toy_outputs(&x);
            TrainingPoint::new(x, y)
        })
        .collect();
    TrainingSet::for_problem(space, &toy_targets(), points).unwrap()
}
