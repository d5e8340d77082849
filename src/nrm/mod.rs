// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! NRM: per-vertex normal estimation from the reconstructed point cloud.
//!
//! For every reconstructed vertex, a k-d tree query ([`kdtree`]) gathers its
//! `normal_knn_k` nearest reconstructed neighbours, a robust plane is fit
//! through the patch ([`crate::mvg::fit_plane_ransac`]), and the plane's
//! normal is oriented to face any calibrated shot that observes the vertex.

mod error;
mod kdtree;

pub use error::NrmError;

use cgmath::Vector3;
use log::debug;
use rand::Rng;

use crate::config::Config;
use crate::geo::{GeoStore, VertexHandle};
use crate::mvg::fit_plane_ransac;
use kdtree::KdTree;

/// World-space position of the camera centre for a calibrated shot:
/// `C = -Rᵀ·T`, the point that projects to the origin of the camera's own
/// coordinate frame.
fn camera_center(r: cgmath::Matrix3<f64>, t: Vector3<f64>) -> (f64, f64, f64) {
    let c = -(r.transpose() * t);
    (c.x, c.y, c.z)
}

/// Runs NRM over every reconstructed vertex in `store`, writing a unit
/// normal back onto each one it could fit a plane for. Returns the number
/// of vertices that received a normal; vertices whose neighbourhood plane
/// fit fails (fewer than 3 usable neighbours, or RANSAC found no
/// consensus) are left without a normal and logged at `debug`, since a
/// missing normal on a handful of vertices should not abort the whole pass.
pub fn compute_normals(store: &mut GeoStore, config: &Config, rng: &mut impl Rng) -> Result<usize, NrmError> {
    let points: Vec<((f64, f64, f64), VertexHandle)> = store
        .vertices()
        .filter_map(|(handle, vertex)| vertex.xyz.map(|xyz| (xyz, handle)))
        .collect();

    if points.len() < 3 {
        return Ok(0);
    }

    let tree = KdTree::build(points.clone());
    let k = config.normal_knn_k as usize;

    let mut computed = 0;
    for (world, vertex) in points {
        let mut neighbourhood: Vec<(f64, f64, f64)> = tree.k_nearest(world, k, |&other| other == vertex);
        neighbourhood.push(world);
        if neighbourhood.len() < 3 {
            debug!("skipping normal for {:?}: only {} usable neighbours", vertex, neighbourhood.len());
            continue;
        }

        let plane = match fit_plane_ransac(&neighbourhood, config.ransac_trials_plane, config.normal_plane_threshold, rng) {
            Ok(plane) => plane,
            Err(err) => {
                debug!("skipping normal for {:?}: plane fit failed ({err})", vertex);
                continue;
            }
        };

        let mut normal = plane.normal;
        if let Some(observer) = find_calibrated_observer(store, vertex) {
            let center = camera_center(observer.r, observer.t);
            // `signed_distance(center)` is positive iff the camera lies on
            // the side the normal currently points toward; a negative
            // value means the normal faces away from every observer, so it
            // is flipped to face outward, toward the camera.
            if plane.signed_distance(center) < 0.0 {
                normal = (-normal.0, -normal.1, -normal.2);
            }
        }

        store.set_vertex_normal(vertex, normal)?;
        computed += 1;
    }

    Ok(computed)
}

struct Observer {
    r: cgmath::Matrix3<f64>,
    t: Vector3<f64>,
}

/// The first calibrated shot (in incidence-set iteration order — no
/// particular priority beyond "any") that observes `vertex`, if any.
fn find_calibrated_observer(store: &GeoStore, vertex: VertexHandle) -> Option<Observer> {
    for (shot_handle, _) in store.marks_of(vertex) {
        if let Ok(shot) = store.shot(shot_handle) {
            if let Some(calibration) = shot.calibration {
                return Some(Observer { r: calibration.r, t: calibration.t });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Calibration, VertexType};
    use crate::mvg::linalg::Mat3x4;
    use cgmath::{Matrix3, Vector3};
    use rand::SeedableRng;

    #[test]
    fn normals_on_a_flat_plane_point_toward_the_observing_camera() {
        let mut store = GeoStore::new();

        // A camera above the z=0 plane looking down the -z axis: world Z
        // axis maps to the negative camera Z axis, so R flips Z (and one
        // other axis to keep det(R) = +1).
        let k = Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 320.0, 240.0, 1.0);
        let r = Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0);
        let center = Vector3::new(0.0, 0.0, 5.0);
        let t = -(r * center);
        let p = Mat3x4::from_krt(k, r, t);
        let shot = store.add_shot("s", 640, 480);
        store.shot_mut(shot).unwrap().calibration = Some(Calibration::from_projection(p).unwrap());

        let mut vertices = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let x = i as f64 * 0.2;
                let y = j as f64 * 0.2;
                let vertex = store.add_vertex(VertexType::Auto);
                store.set_vertex_coords(vertex, (x, y, 0.0)).unwrap();
                if let Some((u, v)) = p.project(x, y, 0.0) {
                    if (0.0..640.0).contains(&u) && (0.0..480.0).contains(&v) {
                        store.add_point(shot, vertex, u / 640.0, v / 480.0).unwrap();
                    }
                }
                vertices.push(vertex);
            }
        }

        let config = Config {
            normal_knn_k: 8,
            ..Config::default()
        };
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let computed = compute_normals(&mut store, &config, &mut rng).unwrap();
        assert!(computed > 0);

        for vertex in vertices {
            if let Some(normal) = store.vertex(vertex).unwrap().normal {
                let len = (normal.0 * normal.0 + normal.1 * normal.1 + normal.2 * normal.2).sqrt();
                assert!((len - 1.0).abs() < 1e-6);
                assert!(normal.2 > 0.0, "expected normal to face the camera at +z, got {:?}", normal);
            }
        }
    }

    #[test]
    fn fewer_than_three_reconstructed_vertices_computes_nothing() {
        let mut store = GeoStore::new();
        let vertex = store.add_vertex(VertexType::Auto);
        store.set_vertex_coords(vertex, (0.0, 0.0, 0.0)).unwrap();
        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert_eq!(compute_normals(&mut store, &config, &mut rng).unwrap(), 0);
    }
}
