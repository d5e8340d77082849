// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Crate-wide error type gluing together the per-component error enums.

use crate::geo::GeoError;
use crate::imgcache::CacheError;
use crate::mvg::MvgError;
use crate::nrm::NrmError;
use crate::topo::TopoError;

/// Errors that can cross an [`crate::act`] entry point.
///
/// Each component defines its own focused error enum (`GeoError`, `MvgError`,
/// `CacheError`, `TopoError`, `NrmError`); this type exists only so
/// orchestration functions that touch more than one component have a single
/// `Result` to return.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Insight3dError {
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error(transparent)]
    Mvg(#[from] MvgError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Topo(#[from] TopoError),
    #[error(transparent)]
    Nrm(#[from] NrmError),
}
