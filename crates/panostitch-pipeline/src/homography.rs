//! Planar homographies: the 3x3 projective transform type and its
//! linear estimation from point correspondences.
//!
//! [`estimate_dlt`] is the minimal/least-squares solver used both for
//! RANSAC hypotheses and for the final refit on all inliers.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Homogeneous `w` components below this magnitude are treated as points
/// at infinity.
const W_EPSILON: f64 = 1e-12;

/// A 3x3 projective transform mapping source points to destination points
/// (up to scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// A pure translation by `(tx, ty)`.
    #[must_use]
    #[rustfmt::skip]
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self(Matrix3::new(
            1.0, 0.0, tx,
            0.0, 1.0, ty,
            0.0, 0.0, 1.0,
        ))
    }

    /// Build from nine row-major coefficients.
    #[must_use]
    pub fn from_row_major(m: [f64; 9]) -> Self {
        Self(Matrix3::from_row_slice(&m))
    }

    /// Row-major coefficients narrowed to `f32`, the layout
    /// `imageproc::geometric_transformations::Projection` expects.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_row_major_f32(&self) -> [f32; 9] {
        let m = &self.0;
        [
            m[(0, 0)] as f32,
            m[(0, 1)] as f32,
            m[(0, 2)] as f32,
            m[(1, 0)] as f32,
            m[(1, 1)] as f32,
            m[(1, 2)] as f32,
            m[(2, 0)] as f32,
            m[(2, 1)] as f32,
            m[(2, 2)] as f32,
        ]
    }

    /// Map a point through the transform, dividing by the homogeneous
    /// `w` component.
    ///
    /// Returns `None` for points mapped to infinity or to non-finite
    /// coordinates.
    #[must_use]
    pub fn project(&self, p: Point) -> Option<Point> {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() < W_EPSILON {
            return None;
        }
        let x = v[0] / w;
        let y = v[1] / w;
        (x.is_finite() && y.is_finite()).then_some(Point::new(x, y))
    }

    /// The transform that applies `self` first, then `next`.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        Self(next.0 * self.0)
    }

    /// The inverse transform, if the matrix is invertible.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Scale so the bottom-right coefficient is one, when it is not
    /// vanishingly small.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let s = self.0[(2, 2)];
        if s.abs() < W_EPSILON {
            *self
        } else {
            Self(self.0 / s)
        }
    }

    /// Euclidean distance between `project(src)` and `dst`, or infinity
    /// when `src` maps to infinity.
    #[must_use]
    pub fn reprojection_error(&self, src: Point, dst: Point) -> f64 {
        self.project(src).map_or(f64::INFINITY, |p| p.distance(dst))
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

/// Translate the centroid to the origin and scale so the mean distance
/// from it is `sqrt(2)`.
#[allow(clippy::cast_precision_loss)]
#[rustfmt::skip]
fn normalize_points(pts: &[Point]) -> (Matrix3<f64>, Vec<Point>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let centroid = Point::new(cx, cy);
    let mean_dist = pts.iter().map(|p| p.distance(centroid)).sum::<f64>() / n;

    let s = if mean_dist > W_EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    );
    let normalized = pts
        .iter()
        .map(|p| Point::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (t, normalized)
}

/// Estimate a homography from four or more correspondences with the
/// normalized direct linear transform.
///
/// The solution is the eigenvector of `AᵀA` with the smallest
/// eigenvalue, which also covers the exactly determined four-point case.
///
/// Returns `None` for fewer than four points, mismatched lengths, or a
/// degenerate (singular) result.
#[must_use]
pub fn estimate_dlt(src: &[Point], dst: &[Point]) -> Option<Homography> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let r = 2 * i;
        a[(r, 3)] = -s.x;
        a[(r, 4)] = -s.y;
        a[(r, 5)] = -1.0;
        a[(r, 6)] = d.y * s.x;
        a[(r, 7)] = d.y * s.y;
        a[(r, 8)] = d.y;

        a[(r + 1, 0)] = s.x;
        a[(r + 1, 1)] = s.y;
        a[(r + 1, 2)] = 1.0;
        a[(r + 1, 6)] = -d.x * s.x;
        a[(r + 1, 7)] = -d.x * s.y;
        a[(r + 1, 8)] = -d.x;
    }

    let ata = a.transpose() * &a;
    let eig = SymmetricEigen::new(ata);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.abs().total_cmp(&y.abs()))
        .map(|(i, _)| i)?;
    let h: Vec<f64> = (0..9).map(|j| eig.eigenvectors[(j, min_idx)]).collect();
    let h_norm = Matrix3::from_row_slice(&h);

    let t_dst_inv = t_dst.try_inverse()?;
    let m = t_dst_inv * h_norm * t_src;
    if !m.iter().all(|v| v.is_finite()) || m.determinant().abs() < W_EPSILON {
        return None;
    }
    Some(Homography(m).normalized())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn assert_point_near(a: Point, b: Point, tol: f64) {
        assert!(
            a.distance(b) < tol,
            "expected ({}, {}) near ({}, {})",
            a.x,
            a.y,
            b.x,
            b.y
        );
    }

    #[test]
    fn identity_projects_to_self() {
        let p = Point::new(12.5, -3.0);
        assert_eq!(Homography::identity().project(p), Some(p));
    }

    #[test]
    fn translation_projects_with_offset() {
        let h = Homography::translation(20.0, -5.0);
        assert_eq!(
            h.project(Point::new(1.0, 1.0)),
            Some(Point::new(21.0, -4.0))
        );
    }

    #[test]
    fn projection_divides_by_w() {
        // Scales every homogeneous coordinate by 2 in w only.
        let h = Homography::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0]);
        assert_eq!(h.project(Point::new(4.0, 6.0)), Some(Point::new(2.0, 3.0)));
    }

    #[test]
    fn point_at_infinity_is_none() {
        let h = Homography::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(h.project(Point::new(0.0, 5.0)), None);
    }

    #[test]
    fn then_applies_left_first() {
        let scale = Homography::from_row_major([2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
        let shift = Homography::translation(10.0, 0.0);
        // Scale then shift: (1, 1) -> (2, 2) -> (12, 2).
        let p = scale.then(&shift).project(Point::new(1.0, 1.0)).unwrap();
        assert_point_near(p, Point::new(12.0, 2.0), 1e-12);
    }

    #[test]
    fn inverse_round_trips() {
        let h = Homography::from_row_major([1.1, 0.05, 3.0, -0.02, 0.95, 7.0, 1e-4, 2e-4, 1.0]);
        let inv = h.inverse().unwrap();
        let p = Point::new(40.0, 25.0);
        let back = inv.project(h.project(p).unwrap()).unwrap();
        assert_point_near(back, p, 1e-9);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let h = Homography::from_row_major([1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0]);
        assert!(h.inverse().is_none());
    }

    #[test]
    fn dlt_recovers_perspective_transform() {
        let truth =
            Homography::from_row_major([0.9, 0.1, 15.0, -0.05, 1.05, -8.0, 2e-4, -1e-4, 1.0]);
        let src: Vec<Point> = (0..6)
            .flat_map(|i| (0..5).map(move |j| Point::new(f64::from(i) * 30.0, f64::from(j) * 25.0)))
            .collect();
        let dst: Vec<Point> = src.iter().map(|&p| truth.project(p).unwrap()).collect();

        let h = estimate_dlt(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(h.reprojection_error(s, d) < 1e-6);
        }
    }

    #[test]
    fn dlt_exact_from_four_points() {
        let src = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 80.0),
            Point::new(0.0, 80.0),
        ];
        let dst: Vec<Point> = src
            .iter()
            .map(|p| Point::new(p.x + 20.0, p.y + 3.0))
            .collect();
        let h = estimate_dlt(&src, &dst).unwrap();
        assert_point_near(
            h.project(Point::new(50.0, 40.0)).unwrap(),
            Point::new(70.0, 43.0),
            1e-8,
        );
    }

    #[test]
    fn dlt_needs_four_points() {
        let pts = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert!(estimate_dlt(&pts, &pts).is_none());
    }

    #[test]
    fn dlt_rejects_mismatched_lengths() {
        let a = [Point::new(0.0, 0.0); 5];
        let b = [Point::new(0.0, 0.0); 4];
        assert!(estimate_dlt(&a, &b).is_none());
    }
}
