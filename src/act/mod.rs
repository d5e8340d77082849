// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! ACT: the orchestration entry points a UI layer calls.
//!
//! Every function here is purely compositional: it reads [`GeoStore`],
//! assembles the inputs MVG/TOPO/NRM need, calls into them, and writes the
//! result back. No new state lives in this module.

use std::collections::HashSet;

use log::trace;
use rand::Rng;

use crate::config::Config;
use crate::geo::{GeoStore, PolygonHandle, ShotHandle, VertexType};
use crate::mvg::{resect_shot, triangulate_vertex_filtered};
use crate::nrm;
use crate::topo;
use crate::Insight3dError;

/// Re-triangulates every vertex with at least two incidences.
///
/// Mirrors the original's `action_triangulate_vertices` loop: if
/// `only_manual` is set, vertices of [`VertexType::Auto`] are skipped
/// entirely (left however they already were) rather than retriangulated. If
/// `shots_mask` is `Some`, only observations on shots it contains are fed to
/// MVG — the mechanism behind "triangulate using only the shots I've
/// selected". A vertex whose triangulation fails is cleared
/// ([`GeoStore::clear_vertex`]) rather than left with a stale position; the
/// failure itself is not propagated; the pass keeps going over the rest of
/// the vertices. Returns the number of vertices that now hold a fresh
/// position.
pub fn triangulate_vertices(
    store: &mut GeoStore,
    shots_mask: Option<&HashSet<ShotHandle>>,
    only_manual: bool,
    config: &Config,
    rng: &mut impl Rng,
) -> Result<usize, Insight3dError> {
    let candidates: Vec<_> = store
        .vertices()
        .filter(|(_, vertex)| !only_manual || vertex.vertex_type == VertexType::User)
        .map(|(handle, _)| handle)
        .collect();

    let mut reconstructed = 0;
    for vertex in candidates {
        match triangulate_vertex_filtered(store, vertex, config, rng, shots_mask) {
            Ok(xyz) => {
                store.set_vertex_coords(vertex, xyz)?;
                reconstructed += 1;
            }
            Err(err) => {
                trace!("triangulation did not reconstruct {:?}: {err}", vertex);
                store.clear_vertex(vertex)?;
            }
        }
    }
    Ok(reconstructed)
}

/// Resections `shot` from its reconstructed-vertex correspondences and
/// installs the result as the shot's [`crate::geo::Calibration`].
///
/// `enforce` selects the same two constraint flags MVG's resection takes:
/// `(square_pixels, zero_skew)`. Requires at least six points on `shot`
/// whose vertex already has a 3D position — the same floor the original
/// checks before attempting DLT. Leaves the shot's existing calibration (if
/// any) untouched on failure.
pub fn resection_shot(
    store: &mut GeoStore,
    shot: ShotHandle,
    enforce: (bool, bool),
    config: &Config,
    rng: &mut impl Rng,
) -> Result<(), Insight3dError> {
    let (square_pixels, zero_skew) = enforce;
    let p = resect_shot(store, shot, config, rng, square_pixels, zero_skew)?;
    let calibration = crate::geo::Calibration::from_projection(p)?;
    store.shot_mut(shot)?.calibration = Some(calibration);
    Ok(())
}

/// Divides `shot`'s image plane into a `cells x cells` grid and counts how
/// many cells contain at least one reconstructed vertex's point. Returns
/// `true` iff at least `min_covered` cells are covered.
///
/// Used to gate bulk resection attempts on "is this shot's point coverage
/// spread out enough to trust a DLT solve", the same role it plays in the
/// original before `action_camera_resection` is invoked automatically over
/// every shot.
pub fn lattice_test(store: &GeoStore, shot: ShotHandle, cells: u32, min_covered: u32) -> Result<bool, Insight3dError> {
    let cells = cells.max(1) as usize;
    let mut covered = vec![false; cells * cells];

    store.for_each_point_on_shot(shot, |_, point| {
        // I1 guarantees `point.vertex` is always a live handle here.
        let vertex = store.vertex(point.vertex).expect("incidence index points at a freed vertex");
        if !vertex.is_reconstructed() {
            return;
        }
        let cx = ((point.x * cells as f64) as usize).min(cells - 1);
        let cy = ((point.y * cells as f64) as usize).min(cells - 1);
        covered[cy * cells + cx] = true;
    })?;

    let covered_count = covered.iter().filter(|&&c| c).count() as u32;
    trace!("lattice test for {:?}: {} of {} cells covered", shot, covered_count, cells * cells);
    Ok(covered_count >= min_covered)
}

/// Runs NRM over every reconstructed vertex. Thin wrapper over
/// [`nrm::compute_normals`]; kept here so the UI layer has one place
/// ([`act`](crate::act)) to call into for every batch operation.
pub fn compute_normals(store: &mut GeoStore, config: &Config, rng: &mut impl Rng) -> Result<usize, Insight3dError> {
    Ok(nrm::compute_normals(store, config, rng)?)
}

/// Runs TOPO for a single shot. Thin wrapper over
/// [`topo::reconstruct_surface`].
pub fn reconstruct_surface(store: &mut GeoStore, shot: ShotHandle, config: &Config) -> Result<Vec<PolygonHandle>, Insight3dError> {
    Ok(topo::reconstruct_surface(store, shot, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvg::linalg::Mat3x4;
    use cgmath::{Matrix3, Vector3};
    use rand::SeedableRng;

    fn camera_at(x: f64, y: f64, z: f64) -> Mat3x4 {
        let k = Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 320.0, 240.0, 1.0);
        let r = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let t = -(r * Vector3::new(x, y, z));
        Mat3x4::from_krt(k, r, t)
    }

    #[test]
    fn triangulate_vertices_reconstructs_and_skips_auto_vertices_when_only_manual() {
        let mut store = GeoStore::new();
        let truth = (0.1, -0.2, 5.0);
        let cams = [camera_at(-1.0, 0.0, 0.0), camera_at(1.0, 0.0, 0.0), camera_at(0.0, 1.0, 0.0)];

        let manual = store.add_vertex(VertexType::User);
        let auto = store.add_vertex(VertexType::Auto);
        for cam in cams {
            let shot = store.add_shot("s", 640, 480);
            store.shot_mut(shot).unwrap().calibration = Some(crate::geo::Calibration::from_projection(cam).unwrap());
            for vertex in [manual, auto] {
                let (u, v) = cam.project(truth.0, truth.1, truth.2).unwrap();
                store.add_point(shot, vertex, u / 640.0, v / 480.0).unwrap();
            }
        }

        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let reconstructed = triangulate_vertices(&mut store, None, true, &config, &mut rng).unwrap();

        assert_eq!(reconstructed, 1);
        assert!(store.vertex(manual).unwrap().is_reconstructed());
        assert!(!store.vertex(auto).unwrap().is_reconstructed());
    }

    #[test]
    fn resection_shot_installs_calibration_from_six_reconstructed_vertices() {
        let mut store = GeoStore::new();
        let cam = camera_at(0.3, -0.2, -4.0);
        let shot = store.add_shot("s", 640, 480);

        let world_points = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 1.0, 0.0),
            (1.0, 0.0, 1.0),
            (0.0, 1.0, 1.0),
        ];
        for world in world_points {
            let vertex = store.add_vertex(VertexType::User);
            store.set_vertex_coords(vertex, world).unwrap();
            let (u, v) = cam.project(world.0, world.1, world.2).unwrap();
            store.add_point(shot, vertex, u / 640.0, v / 480.0).unwrap();
        }

        let config = Config::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        resection_shot(&mut store, shot, (false, false), &config, &mut rng).unwrap();

        assert!(store.shot(shot).unwrap().is_calibrated());
    }

    #[test]
    fn lattice_test_passes_only_when_points_spread_across_enough_cells() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("s", 100, 100);

        // scatter reconstructed points across all 16 cells of a 4x4 grid
        for i in 0..4 {
            for j in 0..4 {
                let vertex = store.add_vertex(VertexType::Auto);
                store.set_vertex_coords(vertex, (i as f64, j as f64, 0.0)).unwrap();
                let x = (i as f64 + 0.5) / 4.0;
                let y = (j as f64 + 0.5) / 4.0;
                store.add_point(shot, vertex, x, y).unwrap();
            }
        }

        assert!(lattice_test(&store, shot, 4, 6).unwrap());
    }

    #[test]
    fn lattice_test_fails_when_points_cluster_in_one_cell() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("s", 100, 100);
        for _ in 0..3 {
            let vertex = store.add_vertex(VertexType::Auto);
            store.set_vertex_coords(vertex, (0.0, 0.0, 0.0)).unwrap();
            store.add_point(shot, vertex, 0.05, 0.05).unwrap();
        }
        assert!(!lattice_test(&store, shot, 4, 6).unwrap());
    }
}
