// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Errors produced by [`crate::nrm`].

use crate::geo::GeoError;
use crate::mvg::MvgError;

/// Failure modes of per-vertex normal estimation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NrmError {
    /// A GEO lookup failed (stale handle).
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// The robust plane fit MVG ran over a vertex's neighbourhood failed.
    /// Not fatal to the pass as a whole: the vertex is simply left without
    /// a normal and the pass continues.
    #[error(transparent)]
    Mvg(#[from] MvgError),
}
