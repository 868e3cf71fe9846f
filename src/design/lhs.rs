//! Jittered Latin hypercube sampling in scaled coordinates.

use rand::seq::SliceRandom;
use rand::Rng;

/// `n` points in `[-1, 1]^dim`, one per stratum along every axis.
///
/// Strata are paired across dimensions by independent shuffles; each point is
/// placed uniformly within its stratum.
pub fn latin_hypercube<R: Rng + ?Sized>(n: usize, dim: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0; dim]; n];
    let mut strata: Vec<usize> = (0..n).collect();
    for j in 0..dim {
        strata.shuffle(rng);
        for (point, &s) in points.iter_mut().zip(&strata) {
            let u = (s as f64 + rng.random::<f64>()) / n as f64;
            point[j] = 2.0 * u - 1.0;
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_one_point_per_stratum() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let n = 25;
        let points = latin_hypercube(n, 3, &mut rng);
        assert_eq!(points.len(), n);
        for j in 0..3 {
            let mut seen = vec![false; n];
            for p in &points {
                assert!((-1.0..1.0).contains(&p[j]));
                let stratum = (((p[j] + 1.0) / 2.0) * n as f64).floor() as usize;
                assert!(!seen[stratum], "stratum {stratum} hit twice in dim {j}");
                seen[stratum] = true;
            }
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = latin_hypercube(10, 2, &mut Xoshiro256PlusPlus::seed_from_u64(9));
        let b = latin_hypercube(10, 2, &mut Xoshiro256PlusPlus::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        assert!(latin_hypercube(0, 2, &mut rng).is_empty());
    }
}
