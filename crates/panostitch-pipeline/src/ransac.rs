//! Robust homography estimation with RANSAC.
//!
//! Hypotheses come from random four-point samples solved with
//! [`estimate_dlt`]; the hypothesis with the most inliers (ties broken by
//! lower summed squared error) wins and is refit on all of its inliers.
//! Sampling uses a seeded `StdRng`, so a given input always yields the
//! same model.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::homography::{Homography, estimate_dlt};
use crate::types::Point;

/// Minimal sample size for a homography.
const SAMPLE_SIZE: usize = 4;

/// Output of a successful robust fit.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyFit {
    /// Model mapping source points to destination points.
    pub homography: Homography,
    /// `inliers[i]` is `true` if correspondence `i` agrees with the model.
    pub inliers: Vec<bool>,
    /// Number of `true` entries in `inliers`.
    pub inlier_count: usize,
}

/// Estimates a homography from noisy correspondences.
pub trait HomographyEstimator {
    /// Fit a model mapping `src[i]` to `dst[i]`.
    ///
    /// Returns `None` when no consistent model exists.
    fn estimate(&self, src: &[Point], dst: &[Point]) -> Option<HomographyFit>;
}

/// Seeded RANSAC over four-point DLT hypotheses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacEstimator {
    /// Maximum reprojection error, in pixels, for an inlier.
    pub threshold: f64,
    /// Number of hypotheses to try.
    pub max_iterations: usize,
    /// Sampling seed.
    pub seed: u64,
}

impl RansacEstimator {
    /// Create an estimator.
    #[must_use]
    pub const fn new(threshold: f64, max_iterations: usize, seed: u64) -> Self {
        Self {
            threshold,
            max_iterations,
            seed,
        }
    }

    /// Inlier mask, count, and summed squared error of `h`.
    fn score(&self, h: &Homography, src: &[Point], dst: &[Point]) -> (Vec<bool>, usize, f64) {
        let mut inliers = vec![false; src.len()];
        let mut count = 0;
        let mut error = 0.0;
        for (i, (&s, &d)) in src.iter().zip(dst).enumerate() {
            let e = h.reprojection_error(s, d);
            if e <= self.threshold {
                inliers[i] = true;
                count += 1;
                error += e * e;
            }
        }
        (inliers, count, error)
    }
}

impl Default for RansacEstimator {
    fn default() -> Self {
        Self::new(5.0, 2000, 0)
    }
}

impl HomographyEstimator for RansacEstimator {
    fn estimate(&self, src: &[Point], dst: &[Point]) -> Option<HomographyFit> {
        let n = src.len();
        if n < SAMPLE_SIZE || dst.len() != n {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(Homography, Vec<bool>, usize)> = None;
        let mut best_error = f64::INFINITY;

        for _ in 0..self.max_iterations {
            let sample = rand::seq::index::sample(&mut rng, n, SAMPLE_SIZE);
            let s: Vec<Point> = sample.iter().map(|i| src[i]).collect();
            let d: Vec<Point> = sample.iter().map(|i| dst[i]).collect();
            let Some(h) = estimate_dlt(&s, &d) else {
                continue;
            };

            let (inliers, count, error) = self.score(&h, src, dst);
            let best_count = best.as_ref().map_or(0, |b| b.2);
            if count > best_count || (count == best_count && error < best_error) {
                best = Some((h, inliers, count));
                best_error = error;
                if count == n {
                    break;
                }
            }
        }

        let (model, inliers, count) = best.filter(|b| b.2 >= SAMPLE_SIZE)?;

        // Refit on the consensus set; keep the refit only if it does not
        // lose support.
        let (in_src, in_dst): (Vec<Point>, Vec<Point>) = src
            .iter()
            .zip(dst)
            .zip(&inliers)
            .filter(|&(_, &keep)| keep)
            .map(|((&s, &d), _)| (s, d))
            .unzip();
        if let Some(refit) = estimate_dlt(&in_src, &in_dst) {
            let (refit_inliers, refit_count, _) = self.score(&refit, src, dst);
            if refit_count >= count {
                return Some(HomographyFit {
                    homography: refit,
                    inliers: refit_inliers,
                    inlier_count: refit_count,
                });
            }
        }

        Some(HomographyFit {
            homography: model,
            inliers,
            inlier_count: count,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::Rng;

    use super::*;

    fn grid() -> Vec<Point> {
        (0..8)
            .flat_map(|i| (0..6).map(move |j| Point::new(f64::from(i) * 17.0, f64::from(j) * 23.0)))
            .collect()
    }

    #[test]
    fn recovers_translation_despite_outliers() {
        let src = grid();
        let mut dst: Vec<Point> = src.iter().map(|p| Point::new(p.x + 20.0, p.y - 4.0)).collect();
        let mut rng = StdRng::seed_from_u64(99);
        // Corrupt every fourth correspondence.
        for p in dst.iter_mut().step_by(4) {
            *p = Point::new(rng.random_range(0.0..300.0), rng.random_range(0.0..300.0));
        }

        let fit = RansacEstimator::default().estimate(&src, &dst).unwrap();
        let moved = fit.homography.project(Point::new(50.0, 50.0)).unwrap();
        assert!(moved.distance(Point::new(70.0, 46.0)) < 0.5);
        assert!(fit.inlier_count >= 36);
        assert_eq!(fit.inliers.iter().filter(|&&b| b).count(), fit.inlier_count);
        for (i, &inlier) in fit.inliers.iter().enumerate() {
            if i % 4 != 0 {
                assert!(inlier, "clean correspondence {i} rejected");
            }
        }
    }

    #[test]
    fn is_deterministic_for_a_seed() {
        let src = grid();
        let mut rng = StdRng::seed_from_u64(5);
        let dst: Vec<Point> = src
            .iter()
            .map(|p| {
                Point::new(
                    p.x * 1.02 + 3.0 + rng.random_range(-0.5..0.5),
                    p.y * 0.98 - 7.0 + rng.random_range(-0.5..0.5),
                )
            })
            .collect();
        let estimator = RansacEstimator::new(2.0, 200, 42);
        let a = estimator.estimate(&src, &dst).unwrap();
        let b = estimator.estimate(&src, &dst).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_points_is_none() {
        let pts = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert!(RansacEstimator::default().estimate(&pts, &pts).is_none());
    }
}
