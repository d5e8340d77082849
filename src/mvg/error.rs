// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Errors produced by [`crate::mvg`].

use crate::geo::GeoError;

/// Failure modes of the multi-view geometry engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MvgError {
    /// Fewer observations were available than the minimal sample needs.
    #[error("need at least {needed} observations, found {found}")]
    TooFewObservations { needed: usize, found: usize },

    /// RANSAC never found a model with enough support.
    #[error("RANSAC found no model with at least {0} inliers")]
    InsufficientInliers(u32),

    /// The minimal sample was numerically degenerate (collinear points,
    /// coincident camera centres, a singular normal-equations matrix).
    #[error("input is numerically degenerate")]
    DegenerateInput,

    /// A GEO lookup used while gathering observations failed.
    #[error(transparent)]
    Geo(#[from] GeoError),
}
