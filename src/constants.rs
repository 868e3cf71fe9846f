//! Constants used throughout the crate.

/// Default deterministic seed for RNG operations.
///
/// Same seed + same emulators = same design. The value `0x6E726F79` is
/// "nroy" encoded in ASCII.
pub const DEFAULT_SEED: u64 = 0x6E72_6F79;

/// Default implausibility cutoff.
///
/// Pukelsheim's 3σ rule: for any continuous unimodal distribution at least
/// 95% of the probability mass lies within 3 standard deviations of the mean.
pub const DEFAULT_CUTOFF: f64 = 3.0;

/// Multiplier applied to emulator standard deviation by the comparison
/// diagnostic.
pub const COMPARISON_SD_MULTIPLIER: f64 = 3.0;

/// Fraction of flagged validation points tolerated by the diagnostics.
pub const DIAGNOSTIC_TOLERANCE: f64 = 0.05;

/// Fraction of comparison-diagnostic failures above which an emulator is
/// dropped from the active set.
pub const DROP_FRACTION: f64 = 0.10;

/// Per-iteration sigma inflation factor used by the correction loop.
pub const SIGMA_INFLATION_STEP: f64 = 1.1;

/// Maximum number of sigma inflation steps before giving up.
pub const MAX_INFLATION_ITERATIONS: usize = 50;

/// Minimum scaled distance between two training points.
///
/// Closer pairs make the training covariance matrix numerically singular.
pub const DUPLICATE_TOLERANCE: f64 = 1e-8;

/// Smallest ratio of Cholesky diagonal extremes (squared) accepted before a
/// covariance matrix is declared ill-conditioned.
pub const MIN_RECIPROCAL_CONDITION: f64 = 1e-13;
