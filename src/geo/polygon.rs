// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Polygons: ordered vertex loops produced by TOPO (or authored by the user).

use crate::geo::VertexHandle;

/// A planar face as an ordered loop of at least three distinct vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: Vec<VertexHandle>,
}

impl Polygon {
    pub(crate) fn new(vertices: Vec<VertexHandle>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[VertexHandle] {
        &self.vertices
    }
}
