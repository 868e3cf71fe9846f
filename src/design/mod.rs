//! Generation of new parameter sets inside the NROY region.
//!
//! ## Pipeline
//!
//! Stages run in order, each only if the candidate pool is still smaller than
//! `count * oversample`:
//!
//! 1. **Rejection** ([`lhs`]): jittered Latin hypercube over the current
//!    ranges, keeping non-implausible points
//! 2. **Line sampling** ([`line`]): lines between accepted and near-boundary
//!    points, with bisection onto the boundary
//! 3. **Importance sampling** ([`importance`]): Gaussian mixture around the
//!    pool, thinned by inverse proposal density
//!
//! The final design is a maximin subset ([`maximin`]) of the pool.
//!
//! Every returned point has been scored against the region and found
//! non-implausible. When the pool cannot supply `count` points within the
//! evaluation budget the design is returned short; see [`Design::shortfall`].

pub mod importance;
pub mod line;
pub mod lhs;
pub mod maximin;

pub use importance::GaussianMixture;
pub use lhs::latin_hypercube;
pub use maximin::maximin_select;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::emulator::EmulatorSet;
use crate::error::{Error, Result};
use crate::implausibility::NroyRegion;
use crate::types::{ParameterSpace, TargetSet};

/// Design generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignConfig {
    /// Latin hypercube points drawn per requested design point.
    ///
    /// Default: 20
    pub lhs_per_point: usize,

    /// Pool size, as a multiple of the requested count, that satisfies a stage.
    ///
    /// Default: 4.0
    pub oversample: f64,

    /// Lines drawn by the line-sampling stage.
    ///
    /// Default: 40
    pub line_pairs: usize,

    /// Points scored along each line.
    ///
    /// Default: 10
    pub line_points: usize,

    /// Fraction of the seed separation by which lines extend past each seed.
    ///
    /// Default: 0.5
    pub line_extension: f64,

    /// Bisection steps toward the boundary at each crossing.
    ///
    /// Default: 6
    pub bisection_steps: usize,

    /// Importance bandwidth as a multiple of the seed spread.
    ///
    /// Default: 0.5
    pub importance_scale: f64,

    /// Points drawn per importance-sampling round.
    ///
    /// Default: 256
    pub importance_batch: usize,

    /// Consecutive rounds with every draw outside the space before giving up.
    ///
    /// Default: 20
    pub max_empty_rounds: usize,

    /// Total implausibility evaluations allowed.
    ///
    /// Default: 200_000
    pub max_evaluations: usize,

    /// Minimum scaled distance between returned points.
    ///
    /// Default: 1e-6
    pub min_separation: f64,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            lhs_per_point: 20,
            oversample: 4.0,
            line_pairs: 40,
            line_points: 10,
            line_extension: 0.5,
            bisection_steps: 6,
            importance_scale: 0.5,
            importance_batch: 256,
            max_empty_rounds: 20,
            max_evaluations: 200_000,
            min_separation: 1e-6,
        }
    }
}

impl DesignConfig {
    /// Set the Latin hypercube size per requested point.
    pub fn lhs_per_point(mut self, n: usize) -> Self {
        assert!(n > 0, "lhs_per_point must be > 0");
        self.lhs_per_point = n;
        self
    }

    /// Set the pool oversampling factor.
    pub fn oversample(mut self, factor: f64) -> Self {
        assert!(factor >= 1.0, "oversample must be >= 1");
        self.oversample = factor;
        self
    }

    /// Set the number of lines and points per line.
    pub fn lines(mut self, pairs: usize, points: usize) -> Self {
        assert!(points >= 2, "line_points must be >= 2");
        self.line_pairs = pairs;
        self.line_points = points;
        self
    }

    /// Set the line extension beyond the seeds.
    pub fn line_extension(mut self, extension: f64) -> Self {
        assert!(extension >= 0.0, "line_extension must be >= 0");
        self.line_extension = extension;
        self
    }

    /// Set the importance bandwidth scale.
    pub fn importance_scale(mut self, scale: f64) -> Self {
        assert!(scale > 0.0, "importance_scale must be > 0");
        self.importance_scale = scale;
        self
    }

    /// Set the importance batch size.
    pub fn importance_batch(mut self, batch: usize) -> Self {
        assert!(batch > 0, "importance_batch must be > 0");
        self.importance_batch = batch;
        self
    }

    /// Set the evaluation budget.
    pub fn max_evaluations(mut self, budget: usize) -> Self {
        assert!(budget > 0, "max_evaluations must be > 0");
        self.max_evaluations = budget;
        self
    }

    /// Set the minimum separation between returned points.
    pub fn min_separation(mut self, separation: f64) -> Self {
        assert!(separation >= 0.0, "min_separation must be >= 0");
        self.min_separation = separation;
        self
    }
}

/// Non-implausible points found by each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageYields {
    /// Latin hypercube stage.
    pub rejection: usize,
    /// Line-sampling stage.
    pub line: usize,
    /// Importance-sampling stage.
    pub importance: usize,
}

impl StageYields {
    /// Total pool size.
    pub fn total(&self) -> usize {
        self.rejection + self.line + self.importance
    }
}

/// Generated design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    /// Selected points in original units, maximin order.
    pub points: Vec<Vec<f64>>,
    /// Number of points asked for.
    pub requested: usize,
    /// Pool contributions per stage.
    pub yields: StageYields,
    /// Implausibility evaluations spent.
    pub evaluations: usize,
}

impl Design {
    /// Number of selected points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was found.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Missing points, if fewer than requested were found.
    pub fn shortfall(&self) -> Option<usize> {
        (self.points.len() < self.requested).then(|| self.requested - self.points.len())
    }

    /// Whether the requested count was met.
    pub fn is_complete(&self) -> bool {
        self.shortfall().is_none()
    }

    /// Fail with [`Error::YieldShortfall`] unless complete.
    pub fn require_complete(self) -> Result<Self> {
        match self.shortfall() {
            None => Ok(self),
            Some(_) => Err(Error::YieldShortfall {
                requested: self.requested,
                produced: self.points.len(),
            }),
        }
    }
}

/// A scored candidate.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// Coordinates scaled to `[-1, 1]`.
    pub(crate) scaled: Vec<f64>,
    /// Original units; this is the point that was scored.
    pub(crate) point: Vec<f64>,
    /// NROY score (non-implausible below 1).
    pub(crate) score: f64,
}

impl Candidate {
    pub(crate) fn accepted(&self) -> bool {
        self.score < 1.0
    }
}

/// Scores batches of scaled points against a region, within a budget.
pub(crate) struct Scorer<'a, 'r> {
    region: &'a NroyRegion<'r>,
    space: &'a ParameterSpace,
    evaluations: usize,
    budget: usize,
}

impl<'a, 'r> Scorer<'a, 'r> {
    fn new(region: &'a NroyRegion<'r>, space: &'a ParameterSpace, budget: usize) -> Self {
        Self {
            region,
            space,
            evaluations: 0,
            budget,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.evaluations)
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Score as many of `scaled` as the budget allows, preserving order.
    pub(crate) fn score(&mut self, mut scaled: Vec<Vec<f64>>) -> Vec<Candidate> {
        scaled.truncate(self.remaining());
        let points: Vec<Vec<f64>> = scaled.iter().map(|u| self.space.from_scaled(u)).collect();
        let scores = self.region.scores(&points);
        self.evaluations += scaled.len();
        scaled
            .into_iter()
            .zip(points)
            .zip(scores)
            .map(|((scaled, point), score)| Candidate {
                scaled,
                point,
                score,
            })
            .collect()
    }
}

/// Generates designs inside an NROY region over a parameter space.
#[derive(Debug, Clone)]
pub struct DesignGenerator<'a, 'r> {
    region: &'a NroyRegion<'r>,
    space: &'a ParameterSpace,
    config: DesignConfig,
}

impl<'a, 'r> DesignGenerator<'a, 'r> {
    /// Generator sampling `space` and filtering by `region`.
    pub fn new(region: &'a NroyRegion<'r>, space: &'a ParameterSpace, config: DesignConfig) -> Self {
        Self {
            region,
            space,
            config,
        }
    }

    /// Generate up to `count` non-implausible, well-separated points.
    pub fn generate<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Design {
        let config = &self.config;
        let mut yields = StageYields::default();
        if count == 0 {
            return Design {
                points: Vec::new(),
                requested: 0,
                yields,
                evaluations: 0,
            };
        }
        let wanted = ((count as f64) * config.oversample).ceil() as usize;
        let mut scorer = Scorer::new(self.region, self.space, config.max_evaluations);

        let lhs = latin_hypercube(count * config.lhs_per_point, self.space.dim(), rng);
        let (mut pool, mut rejected): (Vec<Candidate>, Vec<Candidate>) =
            scorer.score(lhs).into_iter().partition(Candidate::accepted);
        yields.rejection = pool.len();
        rejected.retain(|c| c.score.is_finite());
        rejected.sort_by(|a, b| a.score.total_cmp(&b.score));
        rejected.truncate(count.max(10));
        let boundary = rejected;

        if pool.len() < wanted {
            let found = line::line_sample(&mut scorer, &pool, &boundary, config, rng);
            yields.line = found.len();
            pool.extend(found);
        }

        if pool.len() < wanted {
            let seeds: &[Candidate] = if pool.is_empty() { &boundary } else { &pool };
            let found =
                importance::importance_sample(&mut scorer, seeds, wanted - pool.len(), config, rng);
            yields.importance = found.len();
            pool.extend(found);
        }

        let scaled: Vec<Vec<f64>> = pool.iter().map(|c| c.scaled.clone()).collect();
        let points: Vec<Vec<f64>> = maximin_select(&scaled, count, config.min_separation)
            .into_iter()
            .map(|i| pool[i].point.clone())
            .collect();

        debug!(
            rejection = yields.rejection,
            line = yields.line,
            importance = yields.importance,
            evaluations = scorer.evaluations,
            "design pool"
        );
        if points.len() < count {
            warn!(
                requested = count,
                produced = points.len(),
                evaluations = scorer.evaluations,
                "design yield shortfall"
            );
        }
        Design {
            points,
            requested: count,
            yields,
            evaluations: scorer.evaluations,
        }
    }
}

/// Generate a design against a single emulator set.
pub fn generate_design<R: Rng + ?Sized>(
    emulators: &EmulatorSet,
    targets: &TargetSet,
    space: &ParameterSpace,
    count: usize,
    cutoff: f64,
    config: &DesignConfig,
    rng: &mut R,
) -> Result<Design> {
    let region = NroyRegion::single(emulators, targets, cutoff, 1)?;
    Ok(DesignGenerator::new(&region, space, config.clone()).generate(count, rng))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;
    use crate::emulator::{fit_emulators, EmulatorOptions};
    use crate::test_support::{toy_targets, toy_training_set, unit_square};

    #[test]
    fn test_unconstrained_region_fills_from_lhs() {
        let space = unit_square();
        let region = NroyRegion::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let design = DesignGenerator::new(&region, &space, DesignConfig::default()).generate(10, &mut rng);
        assert!(design.is_complete());
        assert_eq!(design.len(), 10);
        assert_eq!(design.yields.line, 0);
        assert_eq!(design.yields.importance, 0);
        assert!(design.points.iter().all(|p| space.contains(p)));
    }

    #[test]
    fn test_design_points_are_non_implausible() {
        let space = unit_square();
        let training = toy_training_set(&space, 30, 1);
        let targets = toy_targets();
        let set = fit_emulators(&training, &space, &targets, &EmulatorOptions::default()).unwrap();
        let region = NroyRegion::single(&set, &targets, 3.0, 1).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let design = DesignGenerator::new(&region, &space, DesignConfig::default()).generate(15, &mut rng);
        assert!(!design.is_empty());
        for p in &design.points {
            assert!(region.score(p) < 1.0);
        }
        assert!(design.evaluations <= DesignConfig::default().max_evaluations);
    }

    #[test]
    fn test_budget_caps_evaluations_and_reports_shortfall() {
        let space = unit_square();
        let training = toy_training_set(&space, 30, 1);
        let targets = toy_targets();
        let set = fit_emulators(&training, &space, &targets, &EmulatorOptions::default()).unwrap();
        let config = DesignConfig::default().max_evaluations(5);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let design = generate_design(&set, &targets, &space, 50, 3.0, &config, &mut rng).unwrap();
        assert!(design.evaluations <= 5);
        assert_eq!(design.shortfall(), Some(50 - design.len()));
        assert!(matches!(
            design.require_complete(),
            Err(Error::YieldShortfall { requested: 50, .. })
        ));
    }

    #[test]
    fn test_zero_count() {
        let space = unit_square();
        let region = NroyRegion::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let design = DesignGenerator::new(&region, &space, DesignConfig::default()).generate(0, &mut rng);
        assert!(design.is_empty());
        assert!(design.is_complete());
    }

    #[test]
    #[should_panic(expected = "oversample must be >= 1")]
    fn test_oversample_validation() {
        let _ = DesignConfig::default().oversample(0.5);
    }
}
