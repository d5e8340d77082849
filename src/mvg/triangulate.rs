// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! §4.2.1 Robust triangulation: recovering a vertex's 3D position from its
//! marked observations on two or more calibrated shots.

use std::collections::HashSet;

use log::{debug, trace};
use rand::Rng;

use crate::config::Config;
use crate::geo::{GeoStore, ShotHandle, VertexHandle};
use crate::mvg::error::MvgError;
use crate::mvg::linalg::{null_space_vector, DMatrix};
use crate::mvg::linalg::Mat3x4;

/// One calibrated pixel-space observation of a vertex.
struct Observation {
    p: Mat3x4,
    u: f64,
    v: f64,
}

/// Gathers every observation of `vertex` on a currently-calibrated shot, in
/// pixel coordinates (the point's normalised `[0, 1]` position scaled by the
/// shot's width/height). If `shots_mask` is `Some`, only shots it contains
/// are considered — the restriction [`crate::act::triangulate_vertices`]
/// uses to triangulate against a user-chosen subset of views.
fn gather_observations(store: &GeoStore, vertex: VertexHandle, shots_mask: Option<&HashSet<ShotHandle>>) -> Result<Vec<Observation>, MvgError> {
    let mut observations = Vec::new();
    for (shot_handle, index) in store.marks_of(vertex) {
        if shots_mask.is_some_and(|mask| !mask.contains(&shot_handle)) {
            continue;
        }
        let shot = store.shot(shot_handle)?;
        let Some(calibration) = shot.calibration else {
            continue;
        };
        let Some(point) = shot.point(index) else {
            continue;
        };
        observations.push(Observation {
            p: calibration.p,
            u: point.x * shot.width as f64,
            v: point.y * shot.height as f64,
        });
    }
    Ok(observations)
}

/// Direct Linear Transform: stacks two equations per observation and returns
/// the homogeneous least-squares solution, or `None` if the observations are
/// too degenerate to pin down a null space (e.g. identical camera centres).
fn dlt_triangulate(observations: &[&Observation]) -> Option<(f64, f64, f64)> {
    if observations.len() < 2 {
        return None;
    }
    let mut a = DMatrix::zeros(observations.len() * 2, 4);
    for (i, obs) in observations.iter().enumerate() {
        for col in 0..4 {
            let p0 = obs.p.0[0][col];
            let p1 = obs.p.0[1][col];
            let p2 = obs.p.0[2][col];
            a.set(2 * i, col, obs.u * p2 - p0);
            a.set(2 * i + 1, col, obs.v * p2 - p1);
        }
    }
    let h = null_space_vector(&a);
    if h[3].abs() < 1e-9 {
        return None;
    }
    Some((h[0] / h[3], h[1] / h[3], h[2] / h[3]))
}

fn reprojection_error(p: &Mat3x4, u: f64, v: f64, x: (f64, f64, f64)) -> Option<f64> {
    let (ru, rv) = p.project(x.0, x.1, x.2)?;
    Some(((ru - u).powi(2) + (rv - v).powi(2)).sqrt())
}

/// Recovers `vertex`'s 3D position by RANSAC DLT triangulation over its
/// observations on calibrated shots.
///
/// Each trial draws a minimal sample of two observations, triangulates a
/// candidate point, and scores it by the number of observations (including
/// ones outside the sample) that reproject within
/// [`Config::measurement_threshold_px`]. The best-scoring candidate is
/// refined by re-triangulating from all of its inliers. Succeeds outright if
/// the refined candidate has at least [`Config::min_inliers`] inliers, or
/// with a `debug!` note if only [`Config::min_inliers_weaker`] is reached.
pub fn triangulate_vertex(
    store: &GeoStore,
    vertex: VertexHandle,
    config: &Config,
    rng: &mut impl Rng,
) -> Result<(f64, f64, f64), MvgError> {
    triangulate_vertex_filtered(store, vertex, config, rng, None)
}

/// As [`triangulate_vertex`], but restricted to observations on shots in
/// `shots_mask` when it is `Some`. [`crate::act::triangulate_vertices`] uses
/// this to triangulate against only the caller-selected shot subset.
pub fn triangulate_vertex_filtered(
    store: &GeoStore,
    vertex: VertexHandle,
    config: &Config,
    rng: &mut impl Rng,
    shots_mask: Option<&HashSet<ShotHandle>>,
) -> Result<(f64, f64, f64), MvgError> {
    let observations = gather_observations(store, vertex, shots_mask)?;
    if observations.len() < 2 {
        return Err(MvgError::TooFewObservations {
            needed: 2,
            found: observations.len(),
        });
    }

    let mut best_point: Option<(f64, f64, f64)> = None;
    let mut best_inliers: Vec<usize> = Vec::new();

    for _ in 0..config.ransac_trials_triangulate {
        let i = rng.gen_range(0..observations.len());
        let mut j = rng.gen_range(0..observations.len());
        if observations.len() > 1 {
            while j == i {
                j = rng.gen_range(0..observations.len());
            }
        }
        let Some(candidate) = dlt_triangulate(&[&observations[i], &observations[j]]) else {
            continue;
        };

        let inliers: Vec<usize> = observations
            .iter()
            .enumerate()
            .filter_map(|(k, obs)| {
                let err = reprojection_error(&obs.p, obs.u, obs.v, candidate)?;
                (err <= config.measurement_threshold_px).then_some(k)
            })
            .collect();

        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            best_point = Some(candidate);
        }
    }

    if best_point.is_none() {
        return Err(MvgError::DegenerateInput);
    }

    if best_inliers.len() >= config.min_inliers_weaker as usize {
        let refined_obs: Vec<&Observation> = best_inliers.iter().map(|&i| &observations[i]).collect();
        let refined = dlt_triangulate(&refined_obs).or(best_point).ok_or(MvgError::DegenerateInput)?;
        if best_inliers.len() < config.min_inliers as usize {
            debug!(
                "triangulation accepted a vertex with only {} of {} desired inliers",
                best_inliers.len(),
                config.min_inliers
            );
        }
        trace!("triangulated vertex with {} inliers", best_inliers.len());
        Ok(refined)
    } else {
        Err(MvgError::InsufficientInliers(config.min_inliers_weaker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::VertexType;
    use cgmath::{Matrix3, Vector3};
    use rand::SeedableRng;

    fn camera_at(x: f64, y: f64, z: f64) -> Mat3x4 {
        let k = Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 320.0, 240.0, 1.0);
        let r = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        // camera-space translation: world point p maps to camera coords p - center
        let t = -(r * Vector3::new(x, y, z));
        Mat3x4::from_krt(k, r, t)
    }

    #[test]
    fn triangulates_point_seen_from_three_cameras() {
        let mut store = GeoStore::new();
        let truth = (0.1, -0.2, 5.0);
        let cams = [camera_at(-1.0, 0.0, 0.0), camera_at(1.0, 0.0, 0.0), camera_at(0.0, 1.0, 0.0)];

        let vertex = store.add_vertex(VertexType::Auto);
        for cam in cams {
            let shot = store.add_shot("s", 640, 480);
            store.shot_mut(shot).unwrap().calibration = Some(crate::geo::Calibration::from_projection(cam).unwrap());
            let (u, v) = cam.project(truth.0, truth.1, truth.2).unwrap();
            store.add_point(shot, vertex, u / 640.0, v / 480.0).unwrap();
        }

        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let result = triangulate_vertex(&store, vertex, &config, &mut rng).unwrap();
        assert!((result.0 - truth.0).abs() < 1e-3, "{:?}", result);
        assert!((result.1 - truth.1).abs() < 1e-3, "{:?}", result);
        assert!((result.2 - truth.2).abs() < 1e-3, "{:?}", result);
    }

    #[test]
    fn fails_with_a_single_observation() {
        let mut store = GeoStore::new();
        let vertex = store.add_vertex(VertexType::Auto);
        let shot = store.add_shot("s", 640, 480);
        store.shot_mut(shot).unwrap().calibration = Some(crate::geo::Calibration::from_projection(camera_at(0.0, 0.0, 0.0)).unwrap());
        store.add_point(shot, vertex, 0.5, 0.5).unwrap();

        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let err = triangulate_vertex(&store, vertex, &config, &mut rng).unwrap_err();
        assert!(matches!(err, MvgError::TooFewObservations { found: 1, .. }));
    }
}
