// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Errors produced by [`crate::topo`].

use crate::geo::GeoError;

/// Failure modes of surface extraction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TopoError {
    /// Fewer than three reconstructed points were marked on the shot used
    /// as the triangulation's projection plane.
    #[error("need at least 3 reconstructed points on this shot, found {0}")]
    TooFewPoints(usize),

    /// A GEO lookup failed (stale handle, or the shot itself is missing).
    #[error(transparent)]
    Geo(#[from] GeoError),
}
