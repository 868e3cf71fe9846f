//! Line sampling toward the NROY boundary.
//!
//! Pairs of seed points define lines, extended by a fraction beyond both
//! ends. Candidates are scored at jittered, evenly spaced positions; wherever
//! two neighbours straddle the boundary the crossing is refined by bisection
//! and the innermost non-implausible point kept. This concentrates samples on
//! the boundary surface, which uniform sampling of a small region rarely hits.

use rand::Rng;

use super::{Candidate, DesignConfig, Scorer};

fn in_unit_box(u: &[f64]) -> bool {
    u.iter().all(|&v| (-1.0..=1.0).contains(&v))
}

/// Bisect between a non-implausible and an implausible point.
fn bisect(
    scorer: &mut Scorer<'_, '_>,
    inside: &Candidate,
    outside: &Candidate,
    steps: usize,
) -> Option<Candidate> {
    let mut lo = inside.scaled.clone();
    let mut hi = outside.scaled.clone();
    let mut best = None;
    for _ in 0..steps {
        let mid: Vec<f64> = lo.iter().zip(&hi).map(|(a, b)| 0.5 * (a + b)).collect();
        let candidate = scorer.score(vec![mid]).pop()?;
        if candidate.accepted() {
            lo = candidate.scaled.clone();
            best = Some(candidate);
        } else {
            hi = candidate.scaled;
        }
    }
    best
}

/// Sample along lines between seeds, returning the accepted points.
///
/// At least one end of every line is drawn from `accepted` when it is
/// non-empty; `boundary` holds the lowest-scoring rejected points.
pub(super) fn line_sample<R: Rng + ?Sized>(
    scorer: &mut Scorer<'_, '_>,
    accepted: &[Candidate],
    boundary: &[Candidate],
    config: &DesignConfig,
    rng: &mut R,
) -> Vec<Candidate> {
    let seeds: Vec<&Candidate> = accepted.iter().chain(boundary).collect();
    if seeds.len() < 2 {
        return Vec::new();
    }
    let anchors = if accepted.is_empty() {
        seeds.len()
    } else {
        accepted.len()
    };
    let span = 1.0 + 2.0 * config.line_extension;
    let n = config.line_points;

    let mut found = Vec::new();
    for _ in 0..config.line_pairs {
        if scorer.exhausted() {
            break;
        }
        let i = rng.random_range(0..anchors);
        let mut j = rng.random_range(0..seeds.len() - 1);
        if j >= i {
            j += 1;
        }
        let (a, b) = (&seeds[i].scaled, &seeds[j].scaled);

        let along: Vec<Vec<f64>> = (0..n)
            .map(|k| -config.line_extension + span * (k as f64 + rng.random::<f64>()) / n as f64)
            .map(|t| a.iter().zip(b).map(|(x, y)| x + t * (y - x)).collect::<Vec<f64>>())
            .filter(|u| in_unit_box(u))
            .collect();
        let line = scorer.score(along);

        for pair in line.windows(2) {
            let crossing = match (pair[0].accepted(), pair[1].accepted()) {
                (true, false) => Some((&pair[0], &pair[1])),
                (false, true) => Some((&pair[1], &pair[0])),
                _ => None,
            };
            if let Some((inside, outside)) = crossing {
                if let Some(edge) = bisect(scorer, inside, outside, config.bisection_steps) {
                    found.push(edge);
                }
            }
        }
        found.extend(line.into_iter().filter(Candidate::accepted));
    }
    found
}
