// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! [`GeoStore`]: the entity tables and the incidence index tying them
//! together.

use std::collections::{HashMap, HashSet};

use crate::geo::error::GeoError;
use crate::geo::polygon::Polygon;
use crate::geo::shot::{Point, Shot};
use crate::geo::vertex::{Vertex, VertexType};
use crate::slot::{Handle, SlotTable};

pub type ShotHandle = Handle<Shot>;
pub type VertexHandle = Handle<Vertex>;
pub type PolygonHandle = Handle<Polygon>;

/// The geometric store: shots, vertices, polygons, and the incidence index
/// that keeps "which points on which shots observe which vertex" consistent
/// in both directions.
///
/// Invariants maintained by every mutating method (never only by
/// [`GeoStore::validate`], which exists to let tests and callers double
/// check them, not to establish them):
///
/// - **I1** every `(shot, point_index)` pair in the incidence index names a
///   point that actually exists on that shot and whose `vertex` field is the
///   key it is filed under.
/// - **I2** every point on every shot appears in the incidence index under
///   its `vertex`.
/// - **I3** a vertex is marked at most once per shot (no double marking).
/// - **I4** erasing a vertex erases every point that observed it and every
///   polygon that referenced it.
/// - **I5** erasing a shot erases every point on it (and updates the
///   incidence index accordingly), but leaves the vertices those points
///   observed intact.
#[derive(Default)]
pub struct GeoStore {
    shots: SlotTable<Shot>,
    vertices: SlotTable<Vertex>,
    polygons: SlotTable<Polygon>,
    incidence: HashMap<VertexHandle, HashSet<(ShotHandle, usize)>>,
}

impl GeoStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- shots ---------------------------------------------------------

    pub fn add_shot(&mut self, name: impl Into<String>, width: u32, height: u32) -> ShotHandle {
        self.shots.insert(Shot::new(name.into(), width, height))
    }

    pub fn shot(&self, handle: ShotHandle) -> Result<&Shot, GeoError> {
        self.shots.get(handle).ok_or(GeoError::InvalidHandle)
    }

    pub fn shot_mut(&mut self, handle: ShotHandle) -> Result<&mut Shot, GeoError> {
        self.shots.get_mut(handle).ok_or(GeoError::InvalidHandle)
    }

    pub fn shots(&self) -> impl Iterator<Item = (ShotHandle, &Shot)> {
        self.shots.iter()
    }

    pub fn shot_count(&self) -> usize {
        self.shots.len()
    }

    /// Erases a shot and every point marked on it. The vertices those points
    /// observed are left untouched (I5).
    pub fn erase_shot(&mut self, handle: ShotHandle) -> Result<(), GeoError> {
        let shot = self.shots.get(handle).ok_or(GeoError::InvalidHandle)?;
        let observed: Vec<VertexHandle> = shot.points().map(|(_, p)| p.vertex).collect();
        for vertex in observed {
            if let Some(set) = self.incidence.get_mut(&vertex) {
                set.retain(|(s, _)| *s != handle);
                if set.is_empty() {
                    self.incidence.remove(&vertex);
                }
            }
        }
        self.shots.remove(handle);
        Ok(())
    }

    // --- vertices --------------------------------------------------------

    pub fn add_vertex(&mut self, vertex_type: VertexType) -> VertexHandle {
        self.vertices.insert(Vertex::new(vertex_type))
    }

    pub fn vertex(&self, handle: VertexHandle) -> Result<&Vertex, GeoError> {
        self.vertices.get(handle).ok_or(GeoError::InvalidHandle)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (VertexHandle, &Vertex)> {
        self.vertices.iter()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn set_vertex_coords(&mut self, handle: VertexHandle, xyz: (f64, f64, f64)) -> Result<(), GeoError> {
        let vertex = self.vertices.get_mut(handle).ok_or(GeoError::InvalidHandle)?;
        vertex.xyz = Some(xyz);
        Ok(())
    }

    pub fn set_vertex_normal(&mut self, handle: VertexHandle, normal: (f64, f64, f64)) -> Result<(), GeoError> {
        let vertex = self.vertices.get_mut(handle).ok_or(GeoError::InvalidHandle)?;
        vertex.normal = Some(normal);
        Ok(())
    }

    /// Clears a vertex's position and normal without removing it or the
    /// points that observe it; used when a reconstruction is invalidated but
    /// the user's markings should survive.
    pub fn clear_vertex(&mut self, handle: VertexHandle) -> Result<(), GeoError> {
        let vertex = self.vertices.get_mut(handle).ok_or(GeoError::InvalidHandle)?;
        vertex.xyz = None;
        vertex.normal = None;
        Ok(())
    }

    /// Erases a vertex along with every point that observed it (across all
    /// shots) and every polygon that referenced it (I4).
    pub fn erase_vertex(&mut self, handle: VertexHandle) -> Result<(), GeoError> {
        self.vertices.get(handle).ok_or(GeoError::InvalidHandle)?;

        if let Some(marks) = self.incidence.remove(&handle) {
            for (shot, index) in marks {
                if let Some(shot) = self.shots.get_mut(shot) {
                    shot.remove_point(index);
                }
            }
        }

        let dependent_polygons: Vec<PolygonHandle> = self
            .polygons
            .iter()
            .filter(|(_, polygon)| polygon.vertices().contains(&handle))
            .map(|(h, _)| h)
            .collect();
        for polygon in dependent_polygons {
            self.polygons.remove(polygon);
        }

        self.vertices.remove(handle);
        Ok(())
    }

    // --- points ----------------------------------------------------------

    /// Marks `vertex` on `shot` at normalised image coordinates `(x, y)`.
    ///
    /// Fails with [`GeoError::DoubleMarking`] if `vertex` is already marked
    /// on this shot (I3), and with [`GeoError::PointOutOfRange`] if the
    /// coordinates fall outside `[0, 1]`.
    pub fn add_point(
        &mut self,
        shot: ShotHandle,
        vertex: VertexHandle,
        x: f64,
        y: f64,
    ) -> Result<usize, GeoError> {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(GeoError::PointOutOfRange { x, y });
        }
        self.vertices.get(vertex).ok_or(GeoError::InvalidHandle)?;
        if self
            .incidence
            .get(&vertex)
            .is_some_and(|set| set.iter().any(|(s, _)| *s == shot))
        {
            return Err(GeoError::DoubleMarking);
        }
        let shot_ref = self.shots.get_mut(shot).ok_or(GeoError::InvalidHandle)?;
        let index = shot_ref.insert_point(Point { x, y, vertex });
        self.incidence.entry(vertex).or_default().insert((shot, index));
        Ok(index)
    }

    /// Removes the point at `(shot, index)`, updating the incidence index.
    pub fn remove_point(&mut self, shot: ShotHandle, index: usize) -> Result<(), GeoError> {
        let shot_ref = self.shots.get_mut(shot).ok_or(GeoError::InvalidHandle)?;
        let removed = shot_ref
            .remove_point(index)
            .ok_or(GeoError::InvalidPointIndex(index))?;
        if let Some(set) = self.incidence.get_mut(&removed.vertex) {
            set.remove(&(shot, index));
            if set.is_empty() {
                self.incidence.remove(&removed.vertex);
            }
        }
        Ok(())
    }

    /// Calls `f` with every point marked on `shot`, in index order.
    pub fn for_each_point_on_shot(&self, shot: ShotHandle, mut f: impl FnMut(usize, &Point)) -> Result<(), GeoError> {
        let shot_ref = self.shots.get(shot).ok_or(GeoError::InvalidHandle)?;
        for (index, point) in shot_ref.points() {
            f(index, point);
        }
        Ok(())
    }

    /// Every `(shot, point_index)` pair marking `vertex`.
    pub fn marks_of(&self, vertex: VertexHandle) -> impl Iterator<Item = (ShotHandle, usize)> + '_ {
        self.incidence
            .get(&vertex)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    // --- polygons ----------------------------------------------------------

    /// Creates a polygon referencing `vertices`, which must name at least
    /// three distinct, currently-live vertices.
    pub fn add_polygon(&mut self, vertices: Vec<VertexHandle>) -> Result<PolygonHandle, GeoError> {
        if vertices.len() < 3 {
            return Err(GeoError::PolygonTooSmall(vertices.len()));
        }
        let mut seen = HashSet::with_capacity(vertices.len());
        for &v in &vertices {
            self.vertices.get(v).ok_or(GeoError::InvalidHandle)?;
            if !seen.insert(v) {
                return Err(GeoError::RepeatedVertex);
            }
        }
        Ok(self.polygons.insert(Polygon::new(vertices)))
    }

    pub fn polygon(&self, handle: PolygonHandle) -> Result<&Polygon, GeoError> {
        self.polygons.get(handle).ok_or(GeoError::InvalidHandle)
    }

    pub fn polygons(&self) -> impl Iterator<Item = (PolygonHandle, &Polygon)> {
        self.polygons.iter()
    }

    pub fn erase_polygon(&mut self, handle: PolygonHandle) -> Result<(), GeoError> {
        self.polygons.get(handle).ok_or(GeoError::InvalidHandle)?;
        self.polygons.remove(handle);
        Ok(())
    }

    // --- consistency -------------------------------------------------------

    /// Re-derives the incidence index from scratch and checks it against the
    /// live one, along with I3 (no double marking) and polygon vertex
    /// validity. Intended for tests and debug assertions, not the hot path.
    pub fn validate(&self) -> Result<(), GeoError> {
        let mut expected: HashMap<VertexHandle, HashSet<(ShotHandle, usize)>> = HashMap::new();
        for (shot_handle, shot) in self.shots.iter() {
            let mut seen_vertices = HashSet::new();
            for (index, point) in shot.points() {
                if self.vertices.get(point.vertex).is_none() {
                    return Err(GeoError::InvalidHandle);
                }
                if !seen_vertices.insert(point.vertex) {
                    return Err(GeoError::DoubleMarking);
                }
                expected
                    .entry(point.vertex)
                    .or_default()
                    .insert((shot_handle, index));
            }
        }
        if expected != self.incidence {
            return Err(GeoError::InvalidHandle);
        }
        for (_, polygon) in self.polygons.iter() {
            if polygon.vertices().len() < 3 {
                return Err(GeoError::PolygonTooSmall(polygon.vertices().len()));
            }
            for &v in polygon.vertices() {
                if self.vertices.get(v).is_none() {
                    return Err(GeoError::InvalidHandle);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_point_maintains_incidence_both_ways() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("a.jpg", 100, 100);
        let vertex = store.add_vertex(VertexType::User);
        let index = store.add_point(shot, vertex, 0.5, 0.5).unwrap();
        assert_eq!(store.marks_of(vertex).collect::<Vec<_>>(), vec![(shot, index)]);
        store.validate().unwrap();
    }

    #[test]
    fn double_marking_is_rejected() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("a.jpg", 100, 100);
        let vertex = store.add_vertex(VertexType::User);
        store.add_point(shot, vertex, 0.1, 0.1).unwrap();
        let err = store.add_point(shot, vertex, 0.2, 0.2).unwrap_err();
        assert!(matches!(err, GeoError::DoubleMarking));
    }

    #[test]
    fn out_of_range_point_is_rejected() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("a.jpg", 100, 100);
        let vertex = store.add_vertex(VertexType::User);
        let err = store.add_point(shot, vertex, 1.5, 0.2).unwrap_err();
        assert!(matches!(err, GeoError::PointOutOfRange { .. }));
    }

    #[test]
    fn erase_vertex_cascades_to_points_and_polygons() {
        let mut store = GeoStore::new();
        let shot1 = store.add_shot("a.jpg", 100, 100);
        let shot2 = store.add_shot("b.jpg", 100, 100);
        let v1 = store.add_vertex(VertexType::User);
        let v2 = store.add_vertex(VertexType::User);
        let v3 = store.add_vertex(VertexType::User);
        store.add_point(shot1, v1, 0.1, 0.1).unwrap();
        store.add_point(shot2, v1, 0.2, 0.2).unwrap();
        let polygon = store.add_polygon(vec![v1, v2, v3]).unwrap();

        store.erase_vertex(v1).unwrap();

        assert!(store.vertex(v1).is_err());
        assert_eq!(store.marks_of(v1).count(), 0);
        assert_eq!(store.shot(shot1).unwrap().point_count(), 0);
        assert_eq!(store.shot(shot2).unwrap().point_count(), 0);
        assert!(store.polygon(polygon).is_err());
        store.validate().unwrap();
    }

    #[test]
    fn erase_shot_leaves_vertices_intact() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("a.jpg", 100, 100);
        let vertex = store.add_vertex(VertexType::User);
        store.add_point(shot, vertex, 0.3, 0.3).unwrap();

        store.erase_shot(shot).unwrap();

        assert!(store.vertex(vertex).is_ok());
        assert_eq!(store.marks_of(vertex).count(), 0);
        store.validate().unwrap();
    }

    #[test]
    fn remove_point_updates_incidence() {
        let mut store = GeoStore::new();
        let shot = store.add_shot("a.jpg", 100, 100);
        let vertex = store.add_vertex(VertexType::User);
        let index = store.add_point(shot, vertex, 0.4, 0.4).unwrap();

        store.remove_point(shot, index).unwrap();

        assert_eq!(store.marks_of(vertex).count(), 0);
        assert!(store.shot(shot).unwrap().point(index).is_none());
        // vertex can now be marked again on the same shot
        store.add_point(shot, vertex, 0.6, 0.6).unwrap();
        store.validate().unwrap();
    }

    #[test]
    fn polygon_rejects_too_few_or_repeated_vertices() {
        let mut store = GeoStore::new();
        let v1 = store.add_vertex(VertexType::User);
        let v2 = store.add_vertex(VertexType::User);
        assert!(matches!(
            store.add_polygon(vec![v1, v2]).unwrap_err(),
            GeoError::PolygonTooSmall(2)
        ));
        assert!(matches!(
            store.add_polygon(vec![v1, v2, v1]).unwrap_err(),
            GeoError::RepeatedVertex
        ));
    }
}
