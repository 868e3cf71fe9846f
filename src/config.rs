//! Configuration for a history matching run.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::constants::{DEFAULT_CUTOFF, DEFAULT_SEED};
use crate::design::DesignConfig;
use crate::diagnostics::DiagnosticsConfig;
use crate::emulator::EmulatorOptions;

/// Configuration options for [`crate::WaveOrchestrator`].
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Implausibility
    // =========================================================================

    /// Implausibility cutoff below which a point is non-implausible.
    ///
    /// Default: 3.0 (Pukelsheim's 3σ rule).
    pub cutoff: f64,

    /// Which largest per-output implausibility is combined (1 = maximum).
    ///
    /// Higher values tolerate a few badly matched outputs. Default: 1.
    pub nth: usize,

    // =========================================================================
    // Emulation and validation
    // =========================================================================

    /// Emulator fitting options.
    pub emulator: EmulatorOptions,

    /// Diagnostics and correction thresholds.
    pub diagnostics: DiagnosticsConfig,

    // =========================================================================
    // Design and narrowing
    // =========================================================================

    /// Design generation settings.
    pub design: DesignConfig,

    /// Points requested from the design generator per wave.
    ///
    /// Default: 40.
    pub design_points: usize,

    /// Padding added around the design's bounding box when narrowing ranges,
    /// as a fraction of each current width.
    ///
    /// Default: 0.05.
    pub range_margin: f64,

    /// Monte-Carlo samples used to estimate NROY volume.
    ///
    /// Default: 2,000.
    pub volume_samples: usize,

    // =========================================================================
    // Termination
    // =========================================================================

    /// Stop once emulator variance no longer dominates observation
    /// uncertainty for every output.
    ///
    /// Default: true.
    pub stop_on_diminishing_returns: bool,

    /// Emulator-to-observation variance ratio below which returns diminish.
    ///
    /// Default: 1.0.
    pub uncertainty_ratio: f64,

    /// Stop once this fraction of a wave's runs matches every target.
    ///
    /// Default: Some(0.95).
    pub match_rate_stop: Option<f64>,

    // =========================================================================
    // Reproducibility
    // =========================================================================

    /// Seed for [`Config::rng`].
    ///
    /// Default: [`DEFAULT_SEED`].
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Implausibility
            cutoff: DEFAULT_CUTOFF,
            nth: 1,

            // Emulation and validation
            emulator: EmulatorOptions::default(),
            diagnostics: DiagnosticsConfig::default(),

            // Design and narrowing
            design: DesignConfig::default(),
            design_points: 40,
            range_margin: 0.05,
            volume_samples: 2_000,

            // Termination
            stop_on_diminishing_returns: true,
            uncertainty_ratio: 1.0,
            match_rate_stop: Some(0.95),

            // Reproducibility
            seed: DEFAULT_SEED,
        }
    }
}

impl Config {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a quick configuration for development.
    ///
    /// - 20 design points per wave
    /// - smaller design pools and evaluation budget
    pub fn quick() -> Self {
        Self {
            design_points: 20,
            design: DesignConfig::default()
                .lhs_per_point(10)
                .oversample(2.0)
                .max_evaluations(20_000),
            volume_samples: 500,
            ..Default::default()
        }
    }

    /// Create a thorough configuration for detailed analysis.
    ///
    /// - 100 design points per wave
    /// - larger design pools and evaluation budget
    pub fn thorough() -> Self {
        Self {
            design_points: 100,
            design: DesignConfig::default()
                .lhs_per_point(50)
                .oversample(8.0)
                .max_evaluations(2_000_000),
            volume_samples: 20_000,
            ..Default::default()
        }
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    /// Set the implausibility cutoff.
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        assert!(cutoff > 0.0 && cutoff.is_finite(), "cutoff must be positive");
        self.cutoff = cutoff;
        self
    }

    /// Set which largest implausibility is used when combining outputs.
    pub fn nth(mut self, nth: usize) -> Self {
        assert!(nth >= 1, "nth must be >= 1");
        self.nth = nth;
        self
    }

    /// Set the emulator options.
    pub fn emulator(mut self, options: EmulatorOptions) -> Self {
        self.emulator = options;
        self
    }

    /// Set the diagnostics configuration.
    pub fn diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Set the design configuration.
    pub fn design(mut self, design: DesignConfig) -> Self {
        self.design = design;
        self
    }

    /// Set the number of design points per wave.
    pub fn design_points(mut self, n: usize) -> Self {
        assert!(n > 0, "design_points must be positive");
        self.design_points = n;
        self
    }

    /// Set the range narrowing margin.
    pub fn range_margin(mut self, margin: f64) -> Self {
        assert!(
            (0.0..0.5).contains(&margin),
            "range_margin must be in [0, 0.5)"
        );
        self.range_margin = margin;
        self
    }

    /// Set the number of samples used for NROY volume estimates.
    pub fn volume_samples(mut self, n: usize) -> Self {
        assert!(n > 0, "volume_samples must be positive");
        self.volume_samples = n;
        self
    }

    /// Enable or disable the diminishing-returns stop.
    pub fn stop_on_diminishing_returns(mut self, stop: bool) -> Self {
        self.stop_on_diminishing_returns = stop;
        self
    }

    /// Set the emulator-to-observation variance ratio for diminishing returns.
    pub fn uncertainty_ratio(mut self, ratio: f64) -> Self {
        assert!(ratio > 0.0, "uncertainty_ratio must be positive");
        self.uncertainty_ratio = ratio;
        self
    }

    /// Set the target-matching rate that ends the run, or `None` to disable.
    pub fn match_rate_stop(mut self, rate: Option<f64>) -> Self {
        if let Some(rate) = rate {
            assert!(
                rate > 0.0 && rate <= 1.0,
                "match_rate_stop must be in (0, 1]"
            );
        }
        self.match_rate_stop = rate;
        self
    }

    /// Set the seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // =========================================================================
    // Resolution methods
    // =========================================================================

    /// Fresh generator seeded from [`Config::seed`].
    pub fn rng(&self) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(self.seed)
    }

    /// Check if the configuration is valid.
    ///
    /// Returns an error message if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.cutoff > 0.0 && self.cutoff.is_finite()) {
            return Err("cutoff must be positive".to_string());
        }
        if self.nth == 0 {
            return Err("nth must be >= 1".to_string());
        }
        if self.design_points == 0 {
            return Err("design_points must be positive".to_string());
        }
        if !(0.0..0.5).contains(&self.range_margin) {
            return Err("range_margin must be in [0, 0.5)".to_string());
        }
        if self.diagnostics.inflation_step <= 1.0 {
            return Err("inflation_step must be > 1".to_string());
        }
        if self.design.oversample < 1.0 {
            return Err("oversample must be >= 1".to_string());
        }
        if let Some(rate) = self.match_rate_stop {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err("match_rate_stop must be in (0, 1]".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cutoff, 3.0);
        assert_eq!(config.nth, 1);
        assert_eq!(config.design_points, 40);
        assert_eq!(config.match_rate_stop, Some(0.95));
        assert_eq!(config.seed, DEFAULT_SEED);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preset_configs() {
        assert_eq!(Config::quick().design_points, 20);
        assert_eq!(Config::thorough().design_points, 100);
        assert!(Config::quick().validate().is_ok());
        assert!(Config::thorough().validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::new()
            .cutoff(2.5)
            .nth(2)
            .design_points(12)
            .range_margin(0.1)
            .match_rate_stop(None)
            .seed(7);
        assert_eq!(config.cutoff, 2.5);
        assert_eq!(config.nth, 2);
        assert_eq!(config.design_points, 12);
        assert_eq!(config.range_margin, 0.1);
        assert_eq!(config.match_rate_stop, None);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_rng_is_reproducible() {
        let config = Config::new().seed(42);
        let a: u64 = config.rng().random();
        let b: u64 = config.rng().random();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validation() {
        let mut invalid = Config::default();
        invalid.cutoff = 0.0;
        assert!(invalid.validate().is_err());

        let mut invalid = Config::default();
        invalid.range_margin = 0.7;
        assert!(invalid.validate().is_err());
    }

    #[test]
    #[should_panic(expected = "cutoff must be positive")]
    fn test_invalid_cutoff() {
        let _ = Config::new().cutoff(-1.0);
    }

    #[test]
    #[should_panic(expected = "nth must be >= 1")]
    fn test_invalid_nth() {
        let _ = Config::new().nth(0);
    }
}
