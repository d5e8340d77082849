// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Requests: the unit of work a caller submits to [`crate::imgcache::ImageCache`]
//! and the unit the loader thread resolves.

use std::sync::Arc;

use crate::geo::ShotHandle;
use crate::slot::Handle;

/// A live cache request. Required to [`crate::imgcache::ImageCache::cancel`]
/// it and to release the counters and resources it holds.
///
/// Aliases `Handle<RequestRecord>` directly — distinct from GEO's handles
/// because `RequestRecord` and GEO's entity types are different `T`s, the
/// same way [`crate::slot::SlotTable`] already keeps shots, vertices, and
/// polygons apart.
pub type RequestHandle = Handle<RequestRecord>;

/// Which resolution tier(s) a request wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quality {
    /// [`crate::Config::low_size`]-bounded thumbnail, decoded quickly.
    Low,
    /// [`crate::Config::full_size`]-bounded image.
    Full,
    /// Deliver Low as soon as it is available, then transparently upgrade to
    /// Full once that tier is also resident, without ever reporting
    /// not-ready in between.
    Continuous,
}

impl Quality {
    pub(crate) fn wants_low(self) -> bool {
        matches!(self, Quality::Low | Quality::Continuous)
    }

    pub(crate) fn wants_full(self) -> bool {
        matches!(self, Quality::Full | Quality::Continuous)
    }
}

/// Which part of the source image a request wants, in the original image's
/// normalised `[0, 1]` frame (matching [`crate::geo::Point`] coordinates).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Content {
    /// The whole image. Never copied: the request shares the tier buffer.
    All,
    /// A normalised top-left `(x, y)` and normalised `(w, h)` sub-rectangle,
    /// in the original image's frame. Copied out of the resident tier into a
    /// buffer the request owns.
    Region { x: f64, y: f64, w: f64, h: f64 },
    /// A square crop of pixel side lengths `(sx, sy)` in the original
    /// image's pixel space, centred at normalised `(cx, cy)`. Copied, like
    /// `Region`.
    Centered { cx: f64, cy: f64, sx: f64, sy: f64 },
}

impl Content {
    pub(crate) fn is_all(self) -> bool {
        matches!(self, Content::All)
    }
}

/// A normalised `[0, 1]²` sub-rectangle of a texture that holds the real
/// image content. Tier buffers are letterboxed into a fixed square canvas
/// (`full_size`/`low_size`), so this box tells a GPU sampler which part of
/// the texture is real pixels and which is padding, preserving the source
/// image's aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvBox {
    pub u0: f64,
    pub v0: f64,
    pub u1: f64,
    pub v1: f64,
}

impl UvBox {
    pub const FULL: UvBox = UvBox { u0: 0.0, v0: 0.0, u1: 1.0, v1: 1.0 };
}

/// A request's GPU-side readiness, returned by
/// [`crate::imgcache::ImageCache::gpu_ready`].
#[derive(Clone, Debug)]
pub struct GpuReady<T> {
    pub full_tex: Option<T>,
    pub low_tex: Option<T>,
    pub uv_box: UvBox,
}

/// The two concrete resident tiers (as opposed to [`Quality::Continuous`],
/// which is a request-level policy, not a buffer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierQuality {
    Low,
    Full,
}

pub(crate) enum RequestImage {
    /// `Content::All`: a shared reference to the tier buffer itself.
    Shared(Arc<image::RgbImage>),
    /// `Region`/`Centered`: a copy the request owns outright.
    Cut(image::RgbImage),
}

/// Request bookkeeping shared between the public API and the worker thread.
/// Lives inside [`crate::imgcache::state::CacheState`]'s request table.
pub(crate) struct RequestRecord {
    pub shot: ShotHandle,
    pub quality: Quality,
    pub content: Content,
    pub current_quality: Option<TierQuality>,
    pub done: bool,
    /// Which counters this request is still holding, so cancellation and
    /// resolution always decrement exactly what was incremented at submit.
    pub low_total_held: bool,
    pub full_total_held: bool,
    pub low_pending_held: bool,
    pub full_pending_held: bool,
    pub image: Option<RequestImage>,
    pub uv_box: UvBox,
    pub texture_installed: bool,
}

impl RequestRecord {
    pub fn new(shot: ShotHandle, quality: Quality, content: Content) -> Self {
        Self {
            shot,
            quality,
            content,
            current_quality: None,
            done: false,
            low_total_held: false,
            full_total_held: false,
            low_pending_held: false,
            full_pending_held: false,
            image: None,
            uv_box: UvBox::FULL,
            texture_installed: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.done || (self.quality == Quality::Continuous && self.current_quality.is_some())
    }
}
