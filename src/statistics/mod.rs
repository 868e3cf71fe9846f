//! Statistical building blocks for emulator fitting and diagnostics.
//!
//! - Ordinary least squares with per-term significance ([`regression`])
//! - Sample moments used by diagnostics and the design generator ([`summary`])

mod regression;
mod summary;

pub use regression::{ordinary_least_squares, LeastSquaresFit};
pub use summary::{column_std_devs, mean, sample_skewness, sample_variance};
