// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! §4.2.4 Robust plane fitting, used by NRM's lattice test and available to
//! orchestration for ground-plane style constraints.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::mvg::error::MvgError;
use crate::mvg::linalg::{symmetric_eigen, DMatrix};

/// An oriented plane `a·x + b·y + c·z + d = 0` with `(a, b, c)` unit-norm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: (f64, f64, f64),
    pub d: f64,
}

impl Plane {
    pub fn signed_distance(&self, x: (f64, f64, f64)) -> f64 {
        self.normal.0 * x.0 + self.normal.1 * x.1 + self.normal.2 * x.2 + self.d
    }

    fn from_three_points(a: (f64, f64, f64), b: (f64, f64, f64), c: (f64, f64, f64)) -> Option<Plane> {
        let u = (b.0 - a.0, b.1 - a.1, b.2 - a.2);
        let v = (c.0 - a.0, c.1 - a.1, c.2 - a.2);
        let n = (
            u.1 * v.2 - u.2 * v.1,
            u.2 * v.0 - u.0 * v.2,
            u.0 * v.1 - u.1 * v.0,
        );
        let norm = (n.0 * n.0 + n.1 * n.1 + n.2 * n.2).sqrt();
        if norm < 1e-12 {
            return None;
        }
        let normal = (n.0 / norm, n.1 / norm, n.2 / norm);
        let d = -(normal.0 * a.0 + normal.1 * a.1 + normal.2 * a.2);
        Some(Plane { normal, d })
    }

    /// Least-squares plane through `points` about their centroid: the normal
    /// is the eigenvector of the points' covariance matrix with the smallest
    /// eigenvalue (the direction of least spread).
    fn least_squares(points: &[(f64, f64, f64)]) -> Option<Plane> {
        if points.len() < 3 {
            return None;
        }
        let n = points.len() as f64;
        let centroid = points.iter().fold((0.0, 0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1, acc.2 + p.2));
        let centroid = (centroid.0 / n, centroid.1 / n, centroid.2 / n);

        let mut cov = DMatrix::zeros(3, 3);
        for p in points {
            let d = (p.0 - centroid.0, p.1 - centroid.1, p.2 - centroid.2);
            let terms = [d.0, d.1, d.2];
            for i in 0..3 {
                for j in 0..3 {
                    cov.set(i, j, cov.get(i, j) + terms[i] * terms[j]);
                }
            }
        }
        let (eigenvalues, eigenvectors) = symmetric_eigen(&cov, 100);
        let mut best = 0;
        for i in 1..eigenvalues.len() {
            if eigenvalues[i] < eigenvalues[best] {
                best = i;
            }
        }
        let normal = (
            eigenvectors.get(0, best),
            eigenvectors.get(1, best),
            eigenvectors.get(2, best),
        );
        let norm = (normal.0 * normal.0 + normal.1 * normal.1 + normal.2 * normal.2).sqrt();
        if norm < 1e-12 {
            return None;
        }
        let normal = (normal.0 / norm, normal.1 / norm, normal.2 / norm);
        let d = -(normal.0 * centroid.0 + normal.1 * centroid.1 + normal.2 * centroid.2);
        Some(Plane { normal, d })
    }
}

/// Fits a plane to `points` by RANSAC: minimal 3-point samples scored by the
/// number of points within `threshold` of the candidate plane, with the
/// winning inlier set refit by least squares.
pub fn fit_plane_ransac(
    points: &[(f64, f64, f64)],
    trials: u32,
    threshold: f64,
    rng: &mut impl Rng,
) -> Result<Plane, MvgError> {
    if points.len() < 3 {
        return Err(MvgError::TooFewObservations {
            needed: 3,
            found: points.len(),
        });
    }

    let indices: Vec<usize> = (0..points.len()).collect();
    let mut best_inliers: Vec<usize> = Vec::new();

    for _ in 0..trials {
        let mut sample = indices.clone();
        sample.shuffle(rng);
        let Some(plane) = Plane::from_three_points(points[sample[0]], points[sample[1]], points[sample[2]]) else {
            continue;
        };
        let inliers: Vec<usize> = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| (plane.signed_distance(*p).abs() <= threshold).then_some(i))
            .collect();
        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
        }
    }

    if best_inliers.len() < 3 {
        return Err(MvgError::DegenerateInput);
    }

    let inlier_points: Vec<(f64, f64, f64)> = best_inliers.iter().map(|&i| points[i]).collect();
    Plane::least_squares(&inlier_points).ok_or(MvgError::DegenerateInput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn fits_a_noiseless_plane() {
        let points = vec![
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (0.0, 1.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.5, 0.5, 1.0),
            (-0.3, 0.7, 1.0),
        ];
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let plane = fit_plane_ransac(&points, 100, 1e-6, &mut rng).unwrap();
        for p in &points {
            assert!(plane.signed_distance(*p).abs() < 1e-6);
        }
        assert!((plane.normal.2.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_with_fewer_than_three_points() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let err = fit_plane_ransac(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)], 10, 0.1, &mut rng).unwrap_err();
        assert!(matches!(err, MvgError::TooFewObservations { needed: 3, found: 2 }));
    }
}
