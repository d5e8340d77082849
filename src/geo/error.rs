// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Errors produced by [`crate::geo`].

/// Failure modes of the geometric store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GeoError {
    /// A [`crate::geo::ShotHandle`], [`crate::geo::VertexHandle`] or
    /// [`crate::geo::PolygonHandle`] named a slot that is not currently live.
    #[error("handle does not refer to a live entity")]
    InvalidHandle,

    /// A point coordinate fell outside the normalised `[0, 1]` image range.
    #[error("point coordinates ({x}, {y}) are outside the normalised [0, 1] image range")]
    PointOutOfRange { x: f64, y: f64 },

    /// `(shot, point_index)` did not name a live point on that shot.
    #[error("shot has no point at index {0}")]
    InvalidPointIndex(usize),

    /// An attempt to add a point would have marked a vertex twice on the same
    /// shot, violating invariant I3.
    #[error("vertex is already marked by another point on this shot")]
    DoubleMarking,

    /// A polygon referenced fewer than three vertices.
    #[error("a polygon needs at least 3 vertices, got {0}")]
    PolygonTooSmall(usize),

    /// A polygon referenced the same vertex more than once.
    #[error("polygon references vertex more than once")]
    RepeatedVertex,
}
