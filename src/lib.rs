// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! insight3d-core: the reconstruction and resource core of an interactive
//! image-based 3D modelling workbench.
//!
//! A rigid scene is photographed from several viewpoints ([`geo::Shot`]s). The
//! user marks corresponding image points ([`geo::Point`]) which refer to
//! [`geo::Vertex`] entities shared across shots. This crate turns those
//! annotations into camera poses and 3D points ([`mvg`]), serves the
//! photographs to a renderer without blocking the UI thread ([`imgcache`]),
//! extracts a polygonal surface from a reconstructed point cloud ([`topo`]),
//! estimates per-vertex normals ([`nrm`]), and exposes the whole pipeline
//! through a small set of orchestration entry points ([`act`]) meant to be the
//! only thing a UI layer calls.
//!
//! Everything outside these modules — the window, the immediate-mode GUI, file
//! I/O, dense descriptor matching, bundle adjustment — is treated as an
//! external collaborator behind a small capability trait where one is needed.

pub mod act;
pub mod config;
pub mod daisy;
pub mod error;
pub mod geo;
pub mod imgcache;
pub mod mvg;
pub mod nrm;
pub mod slot;
pub mod topo;

pub use config::Config;
pub use error::Insight3dError;
