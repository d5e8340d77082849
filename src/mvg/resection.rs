// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! §4.2.2 Robust camera resection: recovering a shot's projection matrix
//! from six or more vertices whose 3D positions are already known and whose
//! image positions are marked on that shot.

use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Config;
use crate::geo::{GeoStore, ShotHandle};
use crate::mvg::decompose::decompose;
use crate::mvg::error::MvgError;
use crate::mvg::linalg::{null_space_vector, DMatrix, Mat3x4};

const MINIMAL_SAMPLE: usize = 6;

struct Correspondence {
    world: (f64, f64, f64),
    u: f64,
    v: f64,
}

fn gather_correspondences(store: &GeoStore, shot: ShotHandle) -> Result<Vec<Correspondence>, MvgError> {
    let shot_ref = store.shot(shot)?;
    let mut correspondences = Vec::new();
    for (_, point) in shot_ref.points() {
        let vertex = store.vertex(point.vertex)?;
        let Some(world) = vertex.xyz else {
            continue;
        };
        correspondences.push(Correspondence {
            world,
            u: point.x * shot_ref.width as f64,
            v: point.y * shot_ref.height as f64,
        });
    }
    Ok(correspondences)
}

/// DLT resection: stacks two equations per correspondence and returns the
/// homogeneous least-squares projection matrix.
fn dlt_resect(correspondences: &[&Correspondence]) -> Option<Mat3x4> {
    if correspondences.len() < MINIMAL_SAMPLE {
        return None;
    }
    let mut a = DMatrix::zeros(correspondences.len() * 2, 12);
    for (i, c) in correspondences.iter().enumerate() {
        let (x, y, z) = c.world;
        let row0 = 2 * i;
        let row1 = 2 * i + 1;
        a.set(row0, 0, x);
        a.set(row0, 1, y);
        a.set(row0, 2, z);
        a.set(row0, 3, 1.0);
        a.set(row0, 8, -c.u * x);
        a.set(row0, 9, -c.u * y);
        a.set(row0, 10, -c.u * z);
        a.set(row0, 11, -c.u);

        a.set(row1, 4, x);
        a.set(row1, 5, y);
        a.set(row1, 6, z);
        a.set(row1, 7, 1.0);
        a.set(row1, 8, -c.v * x);
        a.set(row1, 9, -c.v * y);
        a.set(row1, 10, -c.v * z);
        a.set(row1, 11, -c.v);
    }
    let h = null_space_vector(&a);
    let rows = [
        [h[0], h[1], h[2], h[3]],
        [h[4], h[5], h[6], h[7]],
        [h[8], h[9], h[10], h[11]],
    ];
    if rows[2].iter().all(|v| v.abs() < 1e-12) {
        return None;
    }
    Some(Mat3x4::from_rows(rows))
}

fn reprojection_error(p: &Mat3x4, c: &Correspondence) -> Option<f64> {
    let (ru, rv) = p.project(c.world.0, c.world.1, c.world.2)?;
    Some(((ru - c.u).powi(2) + (rv - c.v).powi(2)).sqrt())
}

/// Resects `shot`: recovers a finite projection matrix from the
/// correspondences between vertices already positioned in 3D and their
/// marked image points on this shot, by RANSAC DLT over minimal 6-point
/// samples.
///
/// If `zero_skew` or `square_pixels` is set, the refined projection is
/// decomposed, the requested constraint is imposed on the intrinsics (skew
/// zeroed, or the vertical focal length pinned to the horizontal one), and a
/// new projection matrix is recomposed from the constrained `K`. The
/// constrained camera is re-checked against every correspondence and
/// rejected with [`MvgError::InsufficientInliers`] if it no longer reaches
/// [`Config::min_inliers_weaker`] — an unconstrained fit that is only good
/// enough under its own, unconstrained freedom is not silently kept.
///
/// Returns the recovered [`Mat3x4`]; the caller is responsible for writing
/// it into the shot's [`crate::geo::Calibration`] (resection lives in MVG,
/// which only reads GEO).
pub fn resect_shot(
    store: &GeoStore,
    shot: ShotHandle,
    config: &Config,
    rng: &mut impl Rng,
    square_pixels: bool,
    zero_skew: bool,
) -> Result<Mat3x4, MvgError> {
    let correspondences = gather_correspondences(store, shot)?;
    if correspondences.len() < MINIMAL_SAMPLE {
        return Err(MvgError::TooFewObservations {
            needed: MINIMAL_SAMPLE,
            found: correspondences.len(),
        });
    }

    let indices: Vec<usize> = (0..correspondences.len()).collect();
    let mut best_p: Option<Mat3x4> = None;
    let mut best_inliers: Vec<usize> = Vec::new();

    for _ in 0..config.ransac_trials_resection {
        let mut sample = indices.clone();
        sample.shuffle(rng);
        sample.truncate(MINIMAL_SAMPLE);
        let refs: Vec<&Correspondence> = sample.iter().map(|&i| &correspondences[i]).collect();
        let Some(candidate) = dlt_resect(&refs) else {
            continue;
        };

        let inliers: Vec<usize> = correspondences
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let err = reprojection_error(&candidate, c)?;
                (err <= config.measurement_threshold_px).then_some(i)
            })
            .collect();

        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            best_p = Some(candidate);
        }
    }

    let Some(fallback) = best_p else {
        return Err(MvgError::DegenerateInput);
    };

    if best_inliers.len() < config.min_inliers_weaker as usize {
        return Err(MvgError::InsufficientInliers(config.min_inliers_weaker));
    }

    let refined_refs: Vec<&Correspondence> = best_inliers.iter().map(|&i| &correspondences[i]).collect();
    let refined = dlt_resect(&refined_refs).unwrap_or(fallback);
    if best_inliers.len() < config.min_inliers as usize {
        debug!(
            "resection accepted a shot with only {} of {} desired inliers",
            best_inliers.len(),
            config.min_inliers
        );
    }
    trace!("resected shot with {} inliers", best_inliers.len());

    if !square_pixels && !zero_skew {
        return Ok(refined);
    }

    let d = decompose(&refined)?;
    let mut k = d.k;
    if zero_skew {
        k[1][0] = 0.0;
    }
    if square_pixels {
        k[1][1] = k[0][0];
    }
    let constrained = Mat3x4::from_krt(k, d.r, d.t);
    let constrained_inliers = correspondences
        .iter()
        .filter(|c| reprojection_error(&constrained, c).is_some_and(|e| e <= config.measurement_threshold_px))
        .count();
    if constrained_inliers < config.min_inliers_weaker as usize {
        return Err(MvgError::InsufficientInliers(config.min_inliers_weaker));
    }
    debug!(
        "resection constrained to square_pixels={} zero_skew={}: {} of {} correspondences still inliers",
        square_pixels,
        zero_skew,
        constrained_inliers,
        correspondences.len()
    );
    Ok(constrained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::VertexType;
    use cgmath::{Matrix3, Vector3};
    use rand::SeedableRng;

    fn truth_camera() -> Mat3x4 {
        let k = Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 320.0, 240.0, 1.0);
        let r = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let t = -(r * Vector3::new(0.3, -0.2, -4.0));
        Mat3x4::from_krt(k, r, t)
    }

    #[test]
    fn resects_shot_from_eight_known_vertices() {
        let mut store = GeoStore::new();
        let cam = truth_camera();
        let shot = store.add_shot("s", 640, 480);

        let world_points = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 1.0, 0.0),
            (1.0, 0.0, 1.0),
            (0.0, 1.0, 1.0),
            (0.5, 0.5, 0.5),
        ];
        for world in world_points {
            let vertex = store.add_vertex(VertexType::User);
            store.set_vertex_coords(vertex, world).unwrap();
            let (u, v) = cam.project(world.0, world.1, world.2).unwrap();
            store.add_point(shot, vertex, u / 640.0, v / 480.0).unwrap();
        }

        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let p = resect_shot(&store, shot, &config, &mut rng, false, false).unwrap();

        for world in world_points {
            let expected = cam.project(world.0, world.1, world.2).unwrap();
            let got = p.project(world.0, world.1, world.2).unwrap();
            assert!((expected.0 - got.0).abs() < 1.0, "{:?} vs {:?}", expected, got);
            assert!((expected.1 - got.1).abs() < 1.0, "{:?} vs {:?}", expected, got);
        }
    }

    #[test]
    fn fails_with_too_few_correspondences() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("s", 640, 480);
        for i in 0..3 {
            let vertex = store.add_vertex(VertexType::User);
            store.set_vertex_coords(vertex, (i as f64, 0.0, 0.0)).unwrap();
            store.add_point(shot, vertex, 0.1 * i as f64, 0.1).unwrap();
        }
        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let err = resect_shot(&store, shot, &config, &mut rng, false, false).unwrap_err();
        assert!(matches!(err, MvgError::TooFewObservations { needed: 6, found: 3 }));
    }

    #[test]
    fn square_pixels_constraint_still_resects_an_already_square_camera() {
        let mut store = GeoStore::new();
        let cam = truth_camera();
        let shot = store.add_shot("s", 640, 480);

        let world_points = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 1.0, 0.0),
            (1.0, 0.0, 1.0),
            (0.0, 1.0, 1.0),
            (0.5, 0.5, 0.5),
        ];
        for world in world_points {
            let vertex = store.add_vertex(VertexType::User);
            store.set_vertex_coords(vertex, world).unwrap();
            let (u, v) = cam.project(world.0, world.1, world.2).unwrap();
            store.add_point(shot, vertex, u / 640.0, v / 480.0).unwrap();
        }

        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let p = resect_shot(&store, shot, &config, &mut rng, true, true).unwrap();

        for world in world_points {
            let expected = cam.project(world.0, world.1, world.2).unwrap();
            let got = p.project(world.0, world.1, world.2).unwrap();
            assert!((expected.0 - got.0).abs() < 2.0, "{:?} vs {:?}", expected, got);
            assert!((expected.1 - got.1).abs() < 2.0, "{:?} vs {:?}", expected, got);
        }
    }
}
