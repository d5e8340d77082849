// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Vertices: the 3D entities that image points across shots refer to.

/// Distinguishes vertices the user placed explicitly from ones MVG produced
/// while triangulating a point that was never given an a-priori position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexType {
    /// Position was authored directly (a control point, a lattice corner).
    User,
    /// Position came out of triangulation or another automatic process.
    Auto,
}

/// A 3D entity, possibly not yet positioned.
///
/// `xyz` is meaningful only when `reconstructed` is `true`; an
/// un-reconstructed vertex still exists (it can be marked on shots) but has
/// no 3D position yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub xyz: Option<(f64, f64, f64)>,
    pub normal: Option<(f64, f64, f64)>,
    pub vertex_type: VertexType,
}

impl Vertex {
    pub(crate) fn new(vertex_type: VertexType) -> Self {
        Self {
            xyz: None,
            normal: None,
            vertex_type,
        }
    }

    pub fn is_reconstructed(&self) -> bool {
        self.xyz.is_some()
    }
}
