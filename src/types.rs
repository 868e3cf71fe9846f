//! Data model: parameter spaces, targets and simulator runs.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Closed numeric range `[lower, upper]` with `lower < upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl ParameterRange {
    /// Width of the range.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Midpoint of the range.
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    /// Whether `x` lies inside the closed range.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Map `x` to `[-1, 1]`.
    pub fn to_scaled(&self, x: f64) -> f64 {
        (2.0 * x - self.lower - self.upper) / self.width()
    }

    /// Map a scaled coordinate back to the original units.
    pub fn from_scaled(&self, u: f64) -> f64 {
        self.midpoint() + 0.5 * u * self.width()
    }
}

/// A named parameter and its range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Admissible range.
    pub range: ParameterRange,
}

/// Ordered mapping from parameter name to range.
///
/// The set of names is fixed for a calibration run: later waves may narrow
/// ranges (see [`ParameterSpace::narrowed_to`]) but never add, remove or
/// rename parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterSpaceData")]
pub struct ParameterSpace {
    parameters: Vec<Parameter>,
}

/// Unchecked wire form of [`ParameterSpace`].
#[derive(Deserialize)]
struct ParameterSpaceData {
    parameters: Vec<Parameter>,
}

impl TryFrom<ParameterSpaceData> for ParameterSpace {
    type Error = Error;

    fn try_from(data: ParameterSpaceData) -> Result<Self> {
        Self::new(
            data.parameters
                .into_iter()
                .map(|p| (p.name, p.range.lower, p.range.upper)),
        )
    }
}

impl ParameterSpace {
    /// Build a parameter space from `(name, lower, upper)` triples.
    pub fn new<I, S>(parameters: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64, f64)>,
        S: Into<String>,
    {
        let mut out: Vec<Parameter> = Vec::new();
        for (name, lower, upper) in parameters {
            let name = name.into();
            if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                return Err(Error::InvalidRange { name, lower, upper });
            }
            if out.iter().any(|p| p.name == name) {
                return Err(Error::DuplicateName(name));
            }
            out.push(Parameter {
                name,
                range: ParameterRange { lower, upper },
            });
        }
        if out.is_empty() {
            return Err(Error::EmptyParameterSpace);
        }
        Ok(Self { parameters: out })
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.parameters.len()
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Range of the `i`-th parameter.
    pub fn range(&self, i: usize) -> ParameterRange {
        self.parameters[i].range
    }

    /// Position of a parameter by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Return an error unless `point` has one value per parameter.
    pub fn check_dim(&self, point: &[f64]) -> Result<()> {
        if point.len() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: point.len(),
            });
        }
        Ok(())
    }

    /// Whether `point` lies inside every range.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && self
                .parameters
                .iter()
                .zip(point)
                .all(|(p, &x)| p.range.contains(x))
    }

    /// Map a point to `[-1, 1]^d`.
    pub fn to_scaled(&self, point: &[f64]) -> Vec<f64> {
        self.parameters
            .iter()
            .zip(point)
            .map(|(p, &x)| p.range.to_scaled(x))
            .collect()
    }

    /// Map a scaled point back to original units.
    pub fn from_scaled(&self, scaled: &[f64]) -> Vec<f64> {
        self.parameters
            .iter()
            .zip(scaled)
            .map(|(p, &u)| p.range.from_scaled(u))
            .collect()
    }

    /// Draw a point uniformly from the space.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| p.range.lower + rng.random::<f64>() * p.range.width())
            .collect()
    }

    /// Validate that `narrowed` keeps the same names and only shrinks ranges.
    pub fn check_narrowing(&self, narrowed: &ParameterSpace) -> Result<()> {
        if narrowed.dim() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                actual: narrowed.dim(),
            });
        }
        for (old, new) in self.parameters.iter().zip(&narrowed.parameters) {
            if old.name != new.name
                || new.range.lower < old.range.lower
                || new.range.upper > old.range.upper
            {
                return Err(Error::RangeNotNarrowed {
                    name: new.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Smallest box containing `points`, padded by `margin` (a fraction of
    /// each current width) and clipped to the current ranges.
    ///
    /// Dimensions along which every point agrees keep a width of at least
    /// `2 * margin` of the current width so the result stays non-degenerate.
    pub fn narrowed_to(&self, points: &[Vec<f64>], margin: f64) -> Result<ParameterSpace> {
        if points.is_empty() {
            return Err(Error::InsufficientTrainingData {
                available: 0,
                required: 1,
            });
        }
        let mut parameters = Vec::with_capacity(self.dim());
        for (i, param) in self.parameters.iter().enumerate() {
            let (mut lo, mut hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[i]), hi.max(p[i]))
            });
            let pad = margin * param.range.width();
            lo = (lo - pad).max(param.range.lower);
            hi = (hi + pad).min(param.range.upper);
            let min_width = (2.0 * margin).max(1e-6) * param.range.width();
            if hi - lo < min_width {
                let centre = 0.5 * (lo + hi);
                lo = (centre - 0.5 * min_width).max(param.range.lower);
                hi = (lo + min_width).min(param.range.upper);
                lo = (hi - min_width).max(param.range.lower);
            }
            parameters.push(Parameter {
                name: param.name.clone(),
                range: ParameterRange { lower: lo, upper: hi },
            });
        }
        Ok(ParameterSpace { parameters })
    }
}

/// Observed target for one simulator output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Observation with standard deviation: `(value, sigma)`, `sigma > 0`.
    Observation {
        /// Observed value.
        value: f64,
        /// Observation standard deviation.
        sigma: f64,
    },
    /// Acceptance interval `[min, max]`, `min < max`.
    Interval {
        /// Lower acceptable value.
        min: f64,
        /// Upper acceptable value.
        max: f64,
    },
}

impl Target {
    /// Observation target.
    pub fn observation(value: f64, sigma: f64) -> Self {
        Self::Observation { value, sigma }
    }

    /// Interval target.
    pub fn interval(min: f64, max: f64) -> Self {
        Self::Interval { min, max }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let reason = match *self {
            Self::Observation { value, sigma } => {
                if !value.is_finite() {
                    Some(format!("value {value} is not finite"))
                } else if !(sigma.is_finite() && sigma > 0.0) {
                    Some(format!("sigma {sigma} must be positive"))
                } else {
                    None
                }
            }
            Self::Interval { min, max } => {
                if !(min.is_finite() && max.is_finite() && min < max) {
                    Some(format!("interval [{min}, {max}] is empty or not finite"))
                } else {
                    None
                }
            }
        };
        match reason {
            Some(reason) => Err(Error::InvalidTarget {
                name: name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Observation variance `V0` entering the implausibility denominator.
    ///
    /// Interval targets contribute no variance: their width is handled by
    /// measuring distance to the nearest bound instead.
    pub fn observation_variance(&self) -> f64 {
        match *self {
            Self::Observation { sigma, .. } => sigma * sigma,
            Self::Interval { .. } => 0.0,
        }
    }

    /// Variance comparable to an observation variance, used to judge
    /// whether emulator uncertainty still dominates.
    ///
    /// An interval is treated as a ±3σ band.
    pub fn equivalent_variance(&self) -> f64 {
        match *self {
            Self::Observation { sigma, .. } => sigma * sigma,
            Self::Interval { min, max } => {
                let sigma = (max - min) / 6.0;
                sigma * sigma
            }
        }
    }

    /// Signed distance from `z` to the target: `z - value` for observations,
    /// distance outside the interval (0 inside) for intervals.
    pub fn discrepancy(&self, z: f64) -> f64 {
        match *self {
            Self::Observation { value, .. } => z - value,
            Self::Interval { min, max } => {
                if z < min {
                    z - min
                } else if z > max {
                    z - max
                } else {
                    0.0
                }
            }
        }
    }

    /// Whether a simulator output matches the target: within `cutoff`
    /// standard deviations of an observation, or inside an interval.
    pub fn is_matched_by(&self, z: f64, cutoff: f64) -> bool {
        match *self {
            Self::Observation { value, sigma } => (z - value).abs() <= cutoff * sigma,
            Self::Interval { min, max } => z >= min && z <= max,
        }
    }
}

/// A target paired with its output name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTarget {
    /// Output name.
    pub name: String,
    /// Target for that output.
    pub target: Target,
}

/// Ordered set of targets, one per emulated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TargetSetData")]
pub struct TargetSet {
    targets: Vec<NamedTarget>,
}

/// Unchecked wire form of [`TargetSet`].
#[derive(Deserialize)]
struct TargetSetData {
    targets: Vec<NamedTarget>,
}

impl TryFrom<TargetSetData> for TargetSet {
    type Error = Error;

    fn try_from(data: TargetSetData) -> Result<Self> {
        Self::new(data.targets.into_iter().map(|t| (t.name, t.target)))
    }
}

impl TargetSet {
    /// Build a validated target set.
    pub fn new<I, S>(targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Target)>,
        S: Into<String>,
    {
        let mut out: Vec<NamedTarget> = Vec::new();
        for (name, target) in targets {
            let name = name.into();
            target.validate(&name)?;
            if out.iter().any(|t| t.name == name) {
                return Err(Error::DuplicateName(name));
            }
            out.push(NamedTarget { name, target });
        }
        Ok(Self { targets: out })
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether there are no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target for an output.
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name).map(|t| &t.target)
    }

    /// Target for an output, or [`Error::UnknownOutput`].
    pub fn require(&self, name: &str) -> Result<&Target> {
        self.get(name).ok_or_else(|| Error::UnknownOutput(name.to_string()))
    }

    /// Output names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name.as_str())
    }

    /// Iterate over named targets.
    pub fn iter(&self) -> impl Iterator<Item = &NamedTarget> {
        self.targets.iter()
    }
}

/// A single simulator evaluation: parameters in, outputs out.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPoint {
    parameters: Vec<f64>,
    outputs: Vec<f64>,
}

impl TrainingPoint {
    /// Pair a parameter vector with the outputs it produced.
    pub fn new(parameters: Vec<f64>, outputs: Vec<f64>) -> Self {
        Self { parameters, outputs }
    }

    /// Parameter values, one per parameter.
    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Output values, one per output.
    pub fn outputs(&self) -> &[f64] {
        &self.outputs
    }
}

/// Ordered, non-empty collection of simulator runs with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrainingSetData")]
pub struct TrainingSet {
    parameter_names: Vec<String>,
    output_names: Vec<String>,
    points: Vec<TrainingPoint>,
}

/// Unchecked wire form of [`TrainingSet`].
#[derive(Deserialize)]
struct TrainingSetData {
    parameter_names: Vec<String>,
    output_names: Vec<String>,
    points: Vec<TrainingPoint>,
}

impl TryFrom<TrainingSetData> for TrainingSet {
    type Error = Error;

    fn try_from(data: TrainingSetData) -> Result<Self> {
        Self::new(data.parameter_names, data.output_names, data.points)
    }
}

impl TrainingSet {
    /// Build a training set, checking every point's dimensions.
    pub fn new(
        parameter_names: Vec<String>,
        output_names: Vec<String>,
        points: Vec<TrainingPoint>,
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InsufficientTrainingData {
                available: 0,
                required: 1,
            });
        }
        for point in &points {
            if point.parameters.len() != parameter_names.len() {
                return Err(Error::DimensionMismatch {
                    expected: parameter_names.len(),
                    actual: point.parameters.len(),
                });
            }
            if point.outputs.len() != output_names.len() {
                return Err(Error::DimensionMismatch {
                    expected: output_names.len(),
                    actual: point.outputs.len(),
                });
            }
        }
        Ok(Self {
            parameter_names,
            output_names,
            points,
        })
    }

    /// Build a training set whose columns follow a parameter space and target set.
    pub fn for_problem(
        space: &ParameterSpace,
        targets: &TargetSet,
        points: Vec<TrainingPoint>,
    ) -> Result<Self> {
        Self::new(
            space.names().map(str::to_string).collect(),
            targets.names().map(str::to_string).collect(),
            points,
        )
    }

    /// Number of runs.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: training sets are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Runs in order.
    pub fn points(&self) -> &[TrainingPoint] {
        &self.points
    }

    /// Parameter column names.
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Output column names.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Column index of an output.
    pub fn output_index(&self, name: &str) -> Result<usize> {
        self.output_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::UnknownOutput(name.to_string()))
    }

    /// Values of one output across all runs.
    pub fn output_column(&self, name: &str) -> Result<Vec<f64>> {
        let j = self.output_index(name)?;
        Ok(self.points.iter().map(|p| p.outputs[j]).collect())
    }

    fn with_points(&self, points: Vec<TrainingPoint>) -> Result<Self> {
        Self::new(
            self.parameter_names.clone(),
            self.output_names.clone(),
            points,
        )
    }

    /// Split into the first `n` runs and the rest; both halves must be non-empty.
    pub fn split_at(&self, n: usize) -> Result<(Self, Self)> {
        if n == 0 || n >= self.len() {
            return Err(Error::InsufficientTrainingData {
                available: self.len(),
                required: 2,
            });
        }
        let (a, b) = self.points.split_at(n);
        Ok((self.with_points(a.to_vec())?, self.with_points(b.to_vec())?))
    }

    /// Split alternately: even positions train, odd positions validate.
    ///
    /// Yields two disjoint, (nearly) equal-sized subsets.
    pub fn split_alternating(&self) -> Result<(Self, Self)> {
        if self.len() < 2 {
            return Err(Error::InsufficientTrainingData {
                available: self.len(),
                required: 2,
            });
        }
        let (train, validation): (Vec<_>, Vec<_>) = self
            .points
            .iter()
            .cloned()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);
        Ok((
            self.with_points(train.into_iter().map(|(_, p)| p).collect())?,
            self.with_points(validation.into_iter().map(|(_, p)| p).collect())?,
        ))
    }

    /// Fraction of runs whose every output matches its target.
    pub fn match_rate(&self, targets: &TargetSet, cutoff: f64) -> Result<f64> {
        let columns: Vec<(usize, &Target)> = targets
            .iter()
            .map(|t| Ok((self.output_index(&t.name)?, &t.target)))
            .collect::<Result<_>>()?;
        let matched = self
            .points
            .iter()
            .filter(|p| {
                columns
                    .iter()
                    .all(|(j, target)| target.is_matched_by(p.outputs[*j], cutoff))
            })
            .count();
        Ok(matched as f64 / self.len() as f64)
    }
}
