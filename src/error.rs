//! Error types for emulation and history matching.

use thiserror::Error;

/// Reason an emulator could not be fit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FittingFailure {
    /// Two training points coincide (after scaling to the emulator domain).
    ///
    /// The training covariance matrix would be singular; supply distinct
    /// training points.
    #[error("training points {first} and {second} are duplicates (scaled distance {distance:.2e})")]
    DuplicateTrainingPoints {
        /// Index of the first point in the training set.
        first: usize,
        /// Index of the second point in the training set.
        second: usize,
        /// Scaled Euclidean distance between them.
        distance: f64,
    },

    /// Cholesky decomposition of the training covariance matrix failed.
    #[error("training covariance matrix is not positive definite")]
    SingularCovariance,

    /// The training covariance matrix is numerically close to singular.
    #[error("training covariance matrix is ill-conditioned (reciprocal condition {reciprocal_condition:.2e})")]
    IllConditioned {
        /// Estimated reciprocal condition number.
        reciprocal_condition: f64,
    },

    /// The regression design matrix does not have full column rank.
    #[error("regression design matrix is rank deficient")]
    RegressionRankDeficient,

    /// No candidate correlation length produced a usable likelihood.
    #[error("correlation hyperparameters could not be estimated")]
    HyperparameterEstimation,
}

/// Errors raised by the history matching core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A parameter range is empty or not finite.
    #[error("invalid range for parameter '{name}': lower {lower} must be finite and below upper {upper}")]
    InvalidRange {
        /// Parameter name.
        name: String,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// A target has non-positive sigma or an empty interval.
    #[error("invalid target for output '{name}': {reason}")]
    InvalidTarget {
        /// Output name.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The same name was used twice for parameters or outputs.
    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    /// A parameter space was declared with no parameters.
    #[error("parameter space has no parameters")]
    EmptyParameterSpace,

    /// Training columns do not name the parameters of the emulator domain.
    #[error("parameter names {actual:?} do not match domain parameters {expected:?}")]
    ParameterNameMismatch {
        /// Domain parameter names, in order.
        expected: Vec<String>,
        /// Training set parameter names, in order.
        actual: Vec<String>,
    },

    /// A vector had the wrong length.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// No target or training column exists for the named output.
    #[error("unknown output '{0}'")]
    UnknownOutput(String),

    /// Emulator fitting failed for one output.
    #[error("failed to fit emulator for '{output}': {failure}")]
    Fitting {
        /// Output whose emulator could not be fit.
        output: String,
        /// Underlying cause.
        failure: FittingFailure,
    },

    /// Too few usable training points remain.
    #[error("insufficient training data: {available} points available, at least {required} required")]
    InsufficientTrainingData {
        /// Points available.
        available: usize,
        /// Points required.
        required: usize,
    },

    /// Sigma inflation hit its iteration cap with false rejections left.
    #[error("misclassification unresolved after sigma inflation for: {}", outputs.join(", "))]
    MisclassificationUnresolved {
        /// Outputs whose emulators still misclassify.
        outputs: Vec<String>,
    },

    /// The design generator could not fill the requested count.
    #[error("design yield shortfall: requested {requested} points, produced {produced}")]
    YieldShortfall {
        /// Points requested.
        requested: usize,
        /// Points produced.
        produced: usize,
    },

    /// No parameter set survives combined implausibility filtering.
    #[error("NROY region is empty after wave {wave}")]
    EmptyNroy {
        /// Wave index at which the region emptied.
        wave: usize,
    },

    /// Every emulator was dropped by the diagnostics.
    #[error("no usable emulators remain after diagnostics")]
    NoUsableEmulators,

    /// A narrowed parameter space is not contained in the previous one.
    #[error("parameter '{name}' range cannot be widened or renamed when narrowing")]
    RangeNotNarrowed {
        /// Offending parameter.
        name: String,
    },

    /// An orchestrator operation was invoked in the wrong phase.
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        /// Current phase.
        phase: String,
        /// Attempted operation.
        operation: &'static str,
    },
}

/// Result alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
