// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Tunables recognised by the reconstruction core.
//!
//! Unlike most of the rest of the crate, [`Config`] is a plain data value with
//! no behaviour beyond [`Config::repair`]; it is the caller's job to obtain
//! one however it likes (CLI flags, a project file, hardcoded defaults) and
//! pass it to the components that need it.

/// Tunable parameters for MVG, IMGCACHE, TOPO and NRM.
///
/// All fields have the defaults documented below. Values are not validated on
/// construction; call [`Config::repair`] before relying on `cache_full_count`,
/// `cache_low_count`, `full_size`, and `low_size` being nonzero, since a zero
/// there would make the cache permanently unsatisfiable.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// Max resident full-resolution images.
    pub cache_full_count: u32,
    /// Max resident low-resolution images.
    pub cache_low_count: u32,
    /// Square resize target for the Full tier.
    pub full_size: u32,
    /// Square resize target for the Low tier.
    pub low_size: u32,
    /// Bound on the number of simultaneously outstanding cache requests.
    pub max_requests: usize,
    /// Loader thread poll period, in milliseconds.
    pub poll_interval_ms: u64,
    /// RANSAC trials for triangulation (§4.2.1).
    pub ransac_trials_triangulate: u32,
    /// RANSAC trials for camera resection (§4.2.2).
    pub ransac_trials_resection: u32,
    /// RANSAC trials for robust plane fitting (§4.2.4).
    pub ransac_trials_plane: u32,
    /// Inlier radius, in pixels, used by triangulation and resection RANSAC.
    pub measurement_threshold_px: f64,
    /// Minimum inlier count for triangulation to be accepted outright.
    pub min_inliers: u32,
    /// Minimum inlier count for triangulation to be accepted when no better
    /// candidate exists.
    pub min_inliers_weaker: u32,
    /// Neighbourhood size for per-vertex normal estimation.
    pub normal_knn_k: u32,
    /// Inlier threshold, in world units, for the robust plane fit NRM runs
    /// over each vertex's k-nearest-neighbour patch.
    pub normal_plane_threshold: f64,
    /// Per-axis (2D or 3D) compactness acceptance bound for TOPO triangles.
    pub topo_compactness_max: f64,
    /// Maximum allowed disagreement between the 2D and 3D compactness ratios.
    pub topo_compactness_delta_max: f64,
    /// Number of cells per axis in the lattice coverage test.
    pub lattice_cells: u32,
    /// Minimum number of covered cells for the lattice test to pass.
    pub lattice_min_covered: u32,
}

impl Config {
    pub const DEFAULT: Self = Self {
        cache_full_count: 4,
        cache_low_count: 32,
        full_size: 2048,
        low_size: 256,
        max_requests: 1000,
        poll_interval_ms: 400,
        ransac_trials_triangulate: 200,
        ransac_trials_resection: 500,
        ransac_trials_plane: 200,
        measurement_threshold_px: 2.0,
        min_inliers: 3,
        min_inliers_weaker: 2,
        normal_knn_k: 200,
        normal_plane_threshold: 0.05,
        topo_compactness_max: 1.0,
        topo_compactness_delta_max: 0.1,
        lattice_cells: 4,
        lattice_min_covered: 6,
    };

    /// Constrain fields to values that keep the rest of the crate's
    /// invariants satisfiable (nonzero cache sizes and tier dimensions, at
    /// least two RANSAC trials, `min_inliers_weaker <= min_inliers`).
    #[must_use]
    pub fn repair(mut self) -> Self {
        self.cache_full_count = self.cache_full_count.max(1);
        self.cache_low_count = self.cache_low_count.max(1);
        self.full_size = self.full_size.max(1);
        self.low_size = self.low_size.max(1);
        self.max_requests = self.max_requests.max(1);
        self.ransac_trials_triangulate = self.ransac_trials_triangulate.max(1);
        self.ransac_trials_resection = self.ransac_trials_resection.max(1);
        self.ransac_trials_plane = self.ransac_trials_plane.max(1);
        self.measurement_threshold_px = self.measurement_threshold_px.max(1e-6);
        self.min_inliers = self.min_inliers.max(1);
        self.min_inliers_weaker = self.min_inliers_weaker.min(self.min_inliers).max(1);
        self.normal_knn_k = self.normal_knn_k.max(3);
        self.normal_plane_threshold = self.normal_plane_threshold.max(1e-9);
        self.lattice_cells = self.lattice_cells.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = Config::default();
        assert_eq!(c.cache_full_count, 4);
        assert_eq!(c.cache_low_count, 32);
        assert_eq!(c.full_size, 2048);
        assert_eq!(c.low_size, 256);
        assert_eq!(c.ransac_trials_triangulate, 200);
        assert_eq!(c.min_inliers, 3);
        assert_eq!(c.min_inliers_weaker, 2);
        assert_eq!(c.normal_knn_k, 200);
        assert_eq!(c.lattice_cells, 4);
        assert_eq!(c.lattice_min_covered, 6);
    }

    #[test]
    fn repair_clamps_degenerate_values() {
        let c = Config {
            cache_full_count: 0,
            min_inliers: 1,
            min_inliers_weaker: 5,
            ransac_trials_triangulate: 0,
            ..Config::default()
        }
        .repair();
        assert_eq!(c.cache_full_count, 1);
        assert!(c.min_inliers_weaker <= c.min_inliers);
        assert_eq!(c.ransac_trials_triangulate, 1);
    }
}
