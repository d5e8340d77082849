// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Shots (photographs) and the points marked on them.

use cgmath::{Matrix3, Vector3};

use crate::geo::VertexHandle;
use crate::mvg::linalg::Mat3x4;
use crate::mvg::{decompose, euler_xyz, MvgError};

/// The camera pose and intrinsics recovered for a [`Shot`], once MVG has
/// resected it. A shot with no calibration is one the user has not yet
/// resected, or one resection has failed for.
///
/// `k`, `r`, `t` and the derived `euler`/`principal_point` fields are a
/// convenience cache of [`decompose`]'s result, computed once at
/// construction rather than on every read, since nothing about a
/// [`Shot`]'s calibration changes without going through
/// [`Calibration::from_projection`] again.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// Finite projection matrix `P = K·[R|T]`.
    pub p: Mat3x4,
    /// Upper-triangular intrinsics, `K[2][2] == 1`.
    pub k: Matrix3<f64>,
    /// Proper rotation from world to camera axes.
    pub r: Matrix3<f64>,
    /// Camera-space translation.
    pub t: Vector3<f64>,
    /// `(roll, pitch, yaw)` in radians, extracted from `r`.
    pub euler: (f64, f64, f64),
    /// `(cx, cy)` principal point, in pixels, read off `k`.
    pub principal_point: (f64, f64),
}

impl Calibration {
    /// Decomposes `p` into intrinsics/extrinsics and builds a full
    /// `Calibration`. Fails only if `p`'s leading 3×3 is singular (a
    /// degenerate, non-finite camera).
    pub fn from_projection(p: Mat3x4) -> Result<Self, MvgError> {
        let d = decompose(&p)?;
        let euler = euler_xyz(d.r);
        let principal_point = (d.k[2][0], d.k[2][1]);
        Ok(Self {
            p,
            k: d.k,
            r: d.r,
            t: d.t,
            euler,
            principal_point,
        })
    }
}

/// A 2D point marked by the user on a [`Shot`], in normalised `[0, 1]` image
/// coordinates (origin top-left, following the rest of the pack's image
/// conventions), referring to the [`Vertex`](crate::geo::Vertex) it is an
/// observation of.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub vertex: VertexHandle,
}

/// One photograph: pixel dimensions, the points marked on it, and (once
/// resected) its calibration.
///
/// Points are addressed by a plain `usize` index rather than a generation
/// counted [`crate::slot::Handle`] — incidence pairs `(shot, point_index)`
/// are meant to be stored and compared cheaply inside
/// [`crate::geo::GeoStore`]'s incidence index, and a shot's own point table
/// is never handed out or outlives the shot itself.
pub struct Shot {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub calibration: Option<Calibration>,
    points: Vec<Option<Point>>,
    free_points: Vec<usize>,
}

impl Shot {
    pub(crate) fn new(name: String, width: u32, height: u32) -> Self {
        Self {
            name,
            width,
            height,
            calibration: None,
            points: Vec::new(),
            free_points: Vec::new(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Inserts `point`, reusing a released index if one is available, and
    /// returns the index it was stored at.
    pub(crate) fn insert_point(&mut self, point: Point) -> usize {
        if let Some(i) = self.free_points.pop() {
            self.points[i] = Some(point);
            i
        } else {
            self.points.push(Some(point));
            self.points.len() - 1
        }
    }

    pub fn point(&self, index: usize) -> Option<&Point> {
        self.points.get(index).and_then(|p| p.as_ref())
    }

    pub(crate) fn point_mut(&mut self, index: usize) -> Option<&mut Point> {
        self.points.get_mut(index).and_then(|p| p.as_mut())
    }

    /// Releases the point at `index`, if any was there.
    pub(crate) fn remove_point(&mut self, index: usize) -> Option<Point> {
        let slot = self.points.get_mut(index)?;
        let removed = slot.take();
        if removed.is_some() {
            self.free_points.push(index);
        }
        removed
    }

    /// Iterates over `(index, &Point)` for every live point, in index order.
    pub fn points(&self) -> impl Iterator<Item = (usize, &Point)> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }

    pub fn point_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }
}
