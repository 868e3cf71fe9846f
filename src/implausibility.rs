//! Implausibility scoring and NROY membership.
//!
//! For a single output with target `z`:
//!
//! ```text
//! I(x) = |E[f(x)] - z| / sqrt(V0 + Vc(x) + Vm)
//! ```
//!
//! where `V0` is the observation variance, `Vc(x)` the emulator variance and
//! `Vm` the model discrepancy. Interval targets measure the distance to the
//! nearest bound (zero inside) with `V0 = 0`.
//!
//! Across outputs the n-th largest implausibility is used (`nth = 1` is the
//! maximum). A point is non-implausible when the combined value is strictly
//! below the cutoff.
//!
//! An [`NroyRegion`] stacks one [`ImplausibilityEngine`] per wave: later
//! waves' emulators are only trusted inside their own training domain, so a
//! point must lie in every layer's domain and pass every layer's cutoff.

use rand::Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CUTOFF;
use crate::emulator::{Emulator, EmulatorSet};
use crate::error::Result;
use crate::types::{ParameterSpace, Target, TargetSet};

/// Implausibility classification of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Combined implausibility below the cutoff.
    NonImplausible,
    /// Combined implausibility at or above the cutoff.
    Implausible,
}

/// Classify an implausibility value against a cutoff.
pub fn classify(value: f64, cutoff: f64) -> Classification {
    if value < cutoff {
        Classification::NonImplausible
    } else {
        Classification::Implausible
    }
}

/// Implausibility from an expectation and variance.
///
/// A zero denominator gives 0 for an exact match and infinity otherwise.
pub fn implausibility_from_moments(
    expectation: f64,
    variance: f64,
    target: &Target,
    discrepancy: f64,
) -> f64 {
    let distance = target.discrepancy(expectation).abs();
    if distance == 0.0 {
        return 0.0;
    }
    let denominator = target.observation_variance() + variance.max(0.0) + discrepancy;
    if denominator > 0.0 {
        distance / denominator.sqrt()
    } else {
        f64::INFINITY
    }
}

/// Implausibility of one emulator at `x`.
pub fn implausibility(emulator: &Emulator, x: &[f64], target: &Target) -> f64 {
    let p = emulator.predict(x);
    implausibility_from_moments(p.expectation, p.variance, target, emulator.discrepancy())
}

/// Implausibility of a known simulator output (emulator variance 0).
pub fn model_implausibility(output: f64, target: &Target, discrepancy: f64) -> f64 {
    implausibility_from_moments(output, 0.0, target, discrepancy)
}

/// The `nth` largest value (1-based), clamped to the smallest when `nth`
/// exceeds the number of values. Returns 0 for an empty slice.
pub fn nth_maximum(values: &[f64], nth: usize) -> f64 {
    assert!(nth >= 1, "nth must be >= 1");
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted[nth.min(sorted.len()) - 1]
}

/// Combined implausibility of an emulator set at `x`.
pub fn combined_implausibility(
    emulators: &EmulatorSet,
    x: &[f64],
    targets: &TargetSet,
    nth: usize,
) -> Result<f64> {
    Ok(ImplausibilityEngine::new(emulators, targets)?
        .nth(nth)
        .combined(x))
}

/// Scores points against one emulator set and its targets.
#[derive(Debug, Clone)]
pub struct ImplausibilityEngine<'a> {
    pairs: Vec<(&'a Emulator, &'a Target)>,
    nth: usize,
    cutoff: f64,
}

impl<'a> ImplausibilityEngine<'a> {
    /// Pair every emulator with its target.
    ///
    /// # Errors
    ///
    /// [`crate::Error::UnknownOutput`] if an emulator has no target.
    pub fn new(emulators: &'a EmulatorSet, targets: &'a TargetSet) -> Result<Self> {
        let pairs = emulators
            .iter()
            .map(|e| Ok((e, targets.require(e.output_name())?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pairs,
            nth: 1,
            cutoff: DEFAULT_CUTOFF,
        })
    }

    /// Use the `nth` largest implausibility when combining.
    pub fn nth(mut self, nth: usize) -> Self {
        assert!(nth >= 1, "nth must be >= 1");
        self.nth = nth;
        self
    }

    /// Set the classification cutoff.
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        assert!(cutoff > 0.0, "cutoff must be > 0");
        self.cutoff = cutoff;
        self
    }

    /// Classification cutoff.
    pub fn cutoff_value(&self) -> f64 {
        self.cutoff
    }

    /// Per-emulator implausibilities at `x`, in emulator order.
    pub fn individual(&self, x: &[f64]) -> Vec<f64> {
        self.pairs
            .iter()
            .map(|(e, t)| implausibility(e, x, t))
            .collect()
    }

    /// Combined (n-th maximum) implausibility at `x`.
    pub fn combined(&self, x: &[f64]) -> f64 {
        nth_maximum(&self.individual(x), self.nth)
    }

    /// Classify `x`.
    pub fn classify(&self, x: &[f64]) -> Classification {
        classify(self.combined(x), self.cutoff)
    }

    /// Combined implausibility at many points.
    pub fn combined_batch(&self, points: &[Vec<f64>]) -> Vec<f64> {
        #[cfg(feature = "parallel")]
        {
            points.par_iter().map(|x| self.combined(x)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            points.iter().map(|x| self.combined(x)).collect()
        }
    }
}

#[derive(Debug, Clone)]
struct NroyLayer<'a> {
    engine: ImplausibilityEngine<'a>,
    domain: Option<&'a ParameterSpace>,
}

/// Intersection of the non-implausible regions of one or more waves.
#[derive(Debug, Clone, Default)]
pub struct NroyRegion<'a> {
    layers: Vec<NroyLayer<'a>>,
}

impl<'a> NroyRegion<'a> {
    /// Region with no constraints (the whole space).
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Region defined by a single emulator set.
    pub fn single(
        emulators: &'a EmulatorSet,
        targets: &'a TargetSet,
        cutoff: f64,
        nth: usize,
    ) -> Result<Self> {
        Ok(Self::new().with_layer(
            ImplausibilityEngine::new(emulators, targets)?
                .cutoff(cutoff)
                .nth(nth),
            None,
        ))
    }

    /// Add a layer, optionally restricted to the domain its emulators were
    /// trained in. Points outside that domain are ruled out.
    pub fn with_layer(
        mut self,
        engine: ImplausibilityEngine<'a>,
        domain: Option<&'a ParameterSpace>,
    ) -> Self {
        self.layers.push(NroyLayer { engine, domain });
        self
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Largest ratio of combined implausibility to cutoff across layers.
    ///
    /// Values below 1 are non-implausible; infinity marks points outside a
    /// layer's domain.
    pub fn score(&self, x: &[f64]) -> f64 {
        let mut worst: f64 = 0.0;
        for layer in &self.layers {
            if layer.domain.is_some_and(|d| !d.contains(x)) {
                return f64::INFINITY;
            }
            worst = worst.max(layer.engine.combined(x) / layer.engine.cutoff);
            if worst.is_infinite() {
                break;
            }
        }
        worst
    }

    /// Whether `x` is not ruled out by any layer.
    pub fn contains(&self, x: &[f64]) -> bool {
        self.score(x) < 1.0
    }

    /// Scores at many points.
    pub fn scores(&self, points: &[Vec<f64>]) -> Vec<f64> {
        #[cfg(feature = "parallel")]
        {
            points.par_iter().map(|x| self.score(x)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            points.iter().map(|x| self.score(x)).collect()
        }
    }

    /// Monte-Carlo estimate of the fraction of `space` inside the region.
    pub fn volume_fraction<R: Rng + ?Sized>(
        &self,
        space: &ParameterSpace,
        samples: usize,
        rng: &mut R,
    ) -> f64 {
        if samples == 0 {
            return 0.0;
        }
        let points: Vec<Vec<f64>> = (0..samples).map(|_| space.sample_uniform(rng)).collect();
        let inside = self.scores(&points).iter().filter(|&&s| s < 1.0).count();
        inside as f64 / samples as f64
    }
}
