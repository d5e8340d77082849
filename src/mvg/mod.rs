// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! MVG: the multi-view geometry engine.
//!
//! Reads and writes [`crate::geo::GeoStore`] entities but owns none of its
//! own storage. Four robust estimators, all built on the same RANSAC +
//! normal-equations-null-space machinery in [`linalg`]:
//!
//! - [`triangulate::triangulate_vertex`] — 3D position from 2+ views.
//! - [`resection::resect_shot`] — camera pose from 6+ known vertices.
//! - [`decompose::decompose`] — `P` into intrinsics/extrinsics.
//! - [`plane::fit_plane_ransac`] — a robust plane through a point set.

mod decompose;
mod error;
pub mod linalg;
mod plane;
mod resection;
mod triangulate;

pub use decompose::{decompose, euler_xyz, rotation_from_euler_xyz, Decomposition};
pub use error::MvgError;
pub use plane::{fit_plane_ransac, Plane};
pub use resection::resect_shot;
pub use triangulate::{triangulate_vertex, triangulate_vertex_filtered};
