//! Greedy maximin subset selection.

/// Euclidean distance.
pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Select up to `count` indices of `points`, greedily maximising the minimum
/// distance to those already chosen.
///
/// Selection starts from the point farthest from the centroid and stops early
/// once every remaining point lies within `min_separation` of the selection,
/// so the result never contains near-duplicates.
pub fn maximin_select(points: &[Vec<f64>], count: usize, min_separation: f64) -> Vec<usize> {
    if points.is_empty() || count == 0 {
        return Vec::new();
    }
    let dim = points[0].len();
    let centroid: Vec<f64> = (0..dim)
        .map(|j| points.iter().map(|p| p[j]).sum::<f64>() / points.len() as f64)
        .collect();

    let mut nearest: Vec<f64> = points.iter().map(|p| distance(p, &centroid)).collect();
    let mut selected = Vec::with_capacity(count.min(points.len()));
    let mut taken = vec![false; points.len()];
    let mut first = true;

    while selected.len() < count {
        let best = (0..points.len())
            .filter(|&i| !taken[i])
            .max_by(|&a, &b| nearest[a].total_cmp(&nearest[b]));
        let Some(best) = best else { break };
        if !first && nearest[best] < min_separation {
            break;
        }
        if first {
            nearest.iter_mut().for_each(|d| *d = f64::INFINITY);
            first = false;
        }
        taken[best] = true;
        selected.push(best);
        for (i, p) in points.iter().enumerate() {
            if !taken[i] {
                nearest[i] = nearest[i].min(distance(p, &points[best]));
            }
        }
    }
    selected
}
