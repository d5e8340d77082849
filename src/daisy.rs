// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! The DAISY dense-descriptor library is out of scope for this crate (see
//! §1 Non-goals): it is treated as an external collaborator a future
//! point-matching tool depends on, not something reconstructed here. This
//! module exists only to name the capability boundary so that collaborator
//! can be wired in without touching this crate.

/// A dense image descriptor oracle, in the shape of the DAISY algorithm:
/// configure a radial/angular histogram grid, hand it an image, and read
/// back one descriptor vector per pixel.
///
/// No implementation lives in this crate; a caller who wants automatic
/// point matching supplies its own.
pub trait DaisyDescriptor {
    /// Sets the descriptor's radial extent and histogram resolution.
    fn configure(&mut self, radius: f64, radial_quant: u32, angular_quant: u32, hist_quant: u32);

    /// Loads the image the next [`DaisyDescriptor::compute_all`] call
    /// describes. `pixels` is row-major, one byte per channel, `w*h` long
    /// times the (implementation-defined) channel count.
    fn set_image(&mut self, pixels: &[u8], w: u32, h: u32);

    /// Computes one descriptor per pixel of the last image set, flattened
    /// row-major into a single vector.
    fn compute_all(&mut self) -> Vec<f32>;
}
