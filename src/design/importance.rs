//! Importance sampling from a Gaussian mixture centred on known
//! non-implausible points.
//!
//! ```text
//! q(u) = (1/m) Σ_i Π_j φ((u_j - c_ij) / h_j)
//! ```
//!
//! with bandwidth `h_j = scale * sd_j(centres)` (floored). Draws that land
//! inside the NROY region are kept with probability `min(1, q_ref / q(u))`,
//! `q_ref` being the median mixture density at the centres, which thins
//! dense clusters around the seeds and flattens the accepted distribution.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::statistics::column_std_devs;

use super::{Candidate, DesignConfig, Scorer};

/// Smallest bandwidth in scaled units.
const MIN_BANDWIDTH: f64 = 0.02;

/// Axis-aligned Gaussian mixture with a shared bandwidth.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    centres: Vec<Vec<f64>>,
    bandwidth: Vec<f64>,
}

impl GaussianMixture {
    /// Mixture with one component per centre and bandwidth `scale` times the
    /// per-axis standard deviation of the centres.
    pub fn around(centres: Vec<Vec<f64>>, scale: f64) -> Self {
        assert!(!centres.is_empty(), "mixture needs at least one centre");
        let dim = centres[0].len();
        let bandwidth = column_std_devs(&centres, dim)
            .into_iter()
            .map(|sd| (scale * sd).max(MIN_BANDWIDTH))
            .collect();
        Self { centres, bandwidth }
    }

    /// Per-axis bandwidth.
    pub fn bandwidth(&self) -> &[f64] {
        &self.bandwidth
    }

    /// Draw one point.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let centre = &self.centres[rng.random_range(0..self.centres.len())];
        centre
            .iter()
            .zip(&self.bandwidth)
            .map(|(c, h)| {
                let z: f64 = StandardNormal.sample(rng);
                c + h * z
            })
            .collect()
    }

    /// Unnormalised density (constant factors dropped).
    pub fn density(&self, u: &[f64]) -> f64 {
        self.centres
            .iter()
            .map(|c| {
                let q: f64 = u
                    .iter()
                    .zip(c)
                    .zip(&self.bandwidth)
                    .map(|((x, m), h)| ((x - m) / h).powi(2))
                    .sum();
                (-0.5 * q).exp()
            })
            .sum::<f64>()
            / self.centres.len() as f64
    }
}

/// Draw from a mixture around `seeds` until `needed` points are accepted or
/// the evaluation budget runs out.
pub(super) fn importance_sample<R: Rng + ?Sized>(
    scorer: &mut Scorer<'_, '_>,
    seeds: &[Candidate],
    needed: usize,
    config: &DesignConfig,
    rng: &mut R,
) -> Vec<Candidate> {
    if seeds.is_empty() || needed == 0 {
        return Vec::new();
    }
    let mixture = GaussianMixture::around(
        seeds.iter().map(|c| c.scaled.clone()).collect(),
        config.importance_scale,
    );
    let mut seed_densities: Vec<f64> = seeds.iter().map(|c| mixture.density(&c.scaled)).collect();
    seed_densities.sort_by(|a, b| a.total_cmp(b));
    let reference = seed_densities[seed_densities.len() / 2];

    let batch = config.importance_batch;
    // Every round either scores points or draws a whole batch outside the box.
    let max_rounds = scorer.remaining() / batch + 1 + config.max_empty_rounds;
    let mut empty_rounds = 0;
    let mut found = Vec::new();
    for _ in 0..max_rounds {
        if found.len() >= needed || scorer.exhausted() || empty_rounds >= config.max_empty_rounds {
            break;
        }
        let draws: Vec<Vec<f64>> = (0..batch)
            .map(|_| mixture.sample(rng))
            .filter(|u| u.iter().all(|&v| (-1.0..=1.0).contains(&v)))
            .collect();
        if draws.is_empty() {
            empty_rounds += 1;
            continue;
        }
        for candidate in scorer.score(draws) {
            if candidate.accepted()
                && rng.random::<f64>() * mixture.density(&candidate.scaled) <= reference
            {
                found.push(candidate);
            }
        }
    }
    found
}
