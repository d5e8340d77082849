// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! The capability boundary between the cache and a real GPU/windowing
//! backend, which is out of scope for this crate.

/// Uploads and retires decoded CPU-side pixels on the GPU.
///
/// Implementations are expected to be driven from the render thread, since
/// most graphics backends require texture operations to happen there;
/// [`crate::imgcache::ImageCache::gpu_upload`] is the method that calls into
/// this trait, and it must be called from that same thread.
pub trait GpuTextureUploader: Send + Sync {
    /// An opaque handle to an uploaded texture (a backend texture id, a
    /// wrapped `wgpu::Texture`, whatever the caller's renderer needs).
    type Texture: Clone + Send + Sync;

    /// Uploads `rgb` as a new texture and returns a handle to it.
    fn create_texture(&self, rgb: &image::RgbImage) -> Self::Texture;

    /// Replaces `tex`'s contents with `rgb` in place, used when a tier is
    /// re-decoded (e.g. after eviction and reload) and the old texture handle
    /// should stay valid for whoever already holds it. The default
    /// implementation just allocates a new texture; backends that can do an
    /// in-place update should override this.
    fn update_texture(&self, tex: &mut Self::Texture, rgb: &image::RgbImage) {
        *tex = self.create_texture(rgb);
    }

    /// Releases GPU resources held by `tex`. Called when a tier is evicted
    /// and its texture will never be referenced again. The default
    /// implementation does nothing, which is correct for backends (like
    /// tests) whose `Texture` owns no external resource.
    fn destroy_texture(&self, tex: Self::Texture) {
        let _ = tex;
    }
}
