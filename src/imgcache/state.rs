// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Shared state behind the cache's single [`std::sync::Mutex`]: the
//! per-shot resident images and the request table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::geo::ShotHandle;
use crate::imgcache::error::CacheError;
use crate::imgcache::request::{Content, GpuReady, Quality, RequestHandle, RequestImage, RequestRecord, TierQuality, UvBox};
use crate::slot::SlotTable;

/// A decoded, letterboxed tier buffer plus its uploaded texture, once any.
pub(crate) struct CachedTier<T> {
    pub pixels: Arc<image::RgbImage>,
    pub uv_box: UvBox,
    pub texture: Option<T>,
}

/// Everything the cache knows about one shot: its source file, its original
/// dimensions (known once anything has decoded), its resident tiers, and the
/// counters tracking live interest in each tier.
pub(crate) struct ShotEntry<T> {
    pub file: String,
    pub source_dimensions: Option<(u32, u32)>,
    pub full: Option<CachedTier<T>>,
    pub low: Option<CachedTier<T>>,
    pub full_total: u32,
    pub full_pending: u32,
    pub low_total: u32,
    pub low_pending: u32,
    pub suggested: bool,
}

impl<T> ShotEntry<T> {
    fn new(file: String) -> Self {
        Self {
            file,
            source_dimensions: None,
            full: None,
            low: None,
            full_total: 0,
            full_pending: 0,
            low_total: 0,
            low_pending: 0,
            suggested: false,
        }
    }

    fn tier(&self, quality: TierQuality) -> &Option<CachedTier<T>> {
        match quality {
            TierQuality::Full => &self.full,
            TierQuality::Low => &self.low,
        }
    }

    fn tier_mut(&mut self, quality: TierQuality) -> &mut Option<CachedTier<T>> {
        match quality {
            TierQuality::Full => &mut self.full,
            TierQuality::Low => &mut self.low,
        }
    }

    fn total(&self, quality: TierQuality) -> u32 {
        match quality {
            TierQuality::Full => self.full_total,
            TierQuality::Low => self.low_total,
        }
    }

    /// True iff nothing (live request or un-evicted cut) needs this tier
    /// resident, i.e. it is an eviction candidate.
    fn is_idle(&self, quality: TierQuality) -> bool {
        self.total(quality) == 0
    }

    pub fn pending_demand(&self) -> u32 {
        self.full_pending + self.low_pending
    }
}

/// State shared between the public API and the loader thread, guarded by one
/// [`std::sync::Mutex`].
pub(crate) struct CacheState<T> {
    pub shots: HashMap<ShotHandle, ShotEntry<T>>,
    pub requests: SlotTable<RequestRecord>,
    pub pending_requests: usize,
}

impl<T> CacheState<T> {
    pub fn new() -> Self {
        Self {
            shots: HashMap::new(),
            requests: SlotTable::new(),
            pending_requests: 0,
        }
    }

    /// Registers `request`, pinning the counters its quality implies, and
    /// attempts an immediate resolution against whatever is already
    /// resident (the common case for `All` requests on an already-cached
    /// shot).
    pub fn submit(&mut self, shot: ShotHandle, quality: Quality, content: Content) -> RequestHandle {
        let entry = self.shots.entry(shot).or_insert_with(|| ShotEntry::new(String::new()));
        let mut record = RequestRecord::new(shot, quality, content);
        if quality.wants_low() {
            entry.low_total += 1;
            entry.low_pending += 1;
            record.low_total_held = true;
            record.low_pending_held = true;
        }
        if quality.wants_full() {
            entry.full_total += 1;
            entry.full_pending += 1;
            record.full_total_held = true;
            record.full_pending_held = true;
        }
        let handle = self.requests.insert(record);
        self.resolve_request(handle);
        handle
    }

    /// Releases everything `handle` was holding: counters, owned cut buffer,
    /// and request-level texture. Idempotent past the first call (a stale
    /// handle is simply ignored, matching the round-trip law that double
    /// cancellation never leaks or double-frees).
    pub fn cancel(&mut self, handle: RequestHandle) {
        let Some(record) = self.requests.remove(handle) else {
            return;
        };
        if let Some(entry) = self.shots.get_mut(&record.shot) {
            if record.low_total_held {
                entry.low_total = entry.low_total.saturating_sub(1);
            }
            if record.full_total_held {
                entry.full_total = entry.full_total.saturating_sub(1);
            }
            if record.low_pending_held {
                entry.low_pending = entry.low_pending.saturating_sub(1);
                self.pending_requests = self.pending_requests.saturating_sub(1);
            }
            if record.full_pending_held {
                entry.full_pending = entry.full_pending.saturating_sub(1);
                self.pending_requests = self.pending_requests.saturating_sub(1);
            }
            if entry.low_total == 0 {
                if let Some(tier) = entry.low.as_mut() {
                    tier.texture = None;
                }
            }
            if entry.full_total == 0 {
                if let Some(tier) = entry.full.as_mut() {
                    tier.texture = None;
                }
            }
        }
    }

    pub fn is_ready(&self, handle: RequestHandle) -> bool {
        self.requests.get(handle).is_some_and(RequestRecord::is_ready)
    }

    pub fn dimensions(&self, handle: RequestHandle) -> Option<(u32, u32)> {
        let record = self.requests.get(handle)?;
        self.shots.get(&record.shot)?.source_dimensions
    }

    /// Every request's `(shot, wants_low, wants_full)`, used by the worker
    /// to pick the next shot to service and to re-sweep after a decode.
    pub fn shot_demand(&self) -> Option<ShotHandle> {
        self.shots
            .iter()
            .filter(|(_, entry)| entry.pending_demand() > 0)
            .max_by_key(|(_, entry)| entry.pending_demand())
            .map(|(handle, _)| *handle)
    }

    /// Picks the pending and not-yet-resident tier to decode for `shot`:
    /// Full takes priority since it subsumes Low content-wise.
    pub fn next_tier_to_decode(&self, shot: ShotHandle) -> Option<TierQuality> {
        let entry = self.shots.get(&shot)?;
        if entry.full_pending > 0 && entry.full.is_none() {
            Some(TierQuality::Full)
        } else if entry.low_pending > 0 && entry.low.is_none() {
            Some(TierQuality::Low)
        } else {
            None
        }
    }

    pub fn file_of(&self, shot: ShotHandle) -> Option<String> {
        self.shots.get(&shot).map(|e| e.file.clone())
    }

    pub fn set_file(&mut self, shot: ShotHandle, file: String) {
        self.shots.entry(shot).or_insert_with(|| ShotEntry::new(file.clone())).file = file;
    }

    /// Counts how many distinct shots currently hold a resident image at
    /// `quality` (pinned or not — an idle resident still occupies a slot
    /// until evicted).
    fn resident_count(&self, quality: TierQuality) -> u32 {
        self.shots.values().filter(|entry| entry.tier(quality).is_some()).count() as u32
    }

    /// Evicts one idle (unpinned) shot at `quality` to make room, if the
    /// tier is at capacity and `shot` does not already hold it.
    fn make_room(&mut self, shot: ShotHandle, quality: TierQuality, capacity: u32) -> Result<(), CacheError> {
        let already_resident = self.shots.get(&shot).is_some_and(|e| e.tier(quality).is_some());
        if already_resident || self.resident_count(quality) < capacity {
            return Ok(());
        }
        let victim = self
            .shots
            .iter()
            .find(|(handle, entry)| **handle != shot && entry.is_idle(quality) && entry.tier(quality).is_some())
            .map(|(handle, _)| *handle);
        match victim {
            Some(handle) => {
                if let Some(entry) = self.shots.get_mut(&handle) {
                    *entry.tier_mut(quality) = None;
                }
                Ok(())
            }
            None => Err(CacheError::CacheTooSmall(capacity)),
        }
    }

    /// Installs a freshly decoded tier buffer, evicting another shot's idle
    /// tier first if the budget requires it. On [`CacheError::CacheTooSmall`]
    /// the buffer is dropped: the caller (worker) simply retries next cycle,
    /// since `CacheTooSmall` only becomes a hard failure when surfaced
    /// through [`crate::imgcache::ImageCache::submit`] at admission time.
    pub fn install_tier(
        &mut self,
        shot: ShotHandle,
        quality: TierQuality,
        pixels: image::RgbImage,
        uv_box: UvBox,
        dimensions: (u32, u32),
        capacity: u32,
    ) -> Result<(), CacheError> {
        self.make_room(shot, quality, capacity)?;
        let entry = self.shots.entry(shot).or_insert_with(|| ShotEntry::new(String::new()));
        entry.source_dimensions.get_or_insert(dimensions);
        *entry.tier_mut(quality) = Some(CachedTier {
            pixels: Arc::new(pixels),
            uv_box,
            texture: None,
        });
        Ok(())
    }

    /// Re-attempts resolution of `handle` against whatever is currently
    /// resident. Safe to call redundantly (e.g. on every submit and after
    /// every decode); it is a no-op once the request is already `done`.
    pub fn resolve_request(&mut self, handle: RequestHandle) {
        let Some(record) = self.requests.get(handle) else { return };
        if record.done {
            return;
        }
        let shot = record.shot;
        let wants_low = record.quality.wants_low();
        let wants_full = record.quality.wants_full();
        let content = record.content;

        if wants_low && record.current_quality.is_none() {
            let cut = self.shots.get(&shot).and_then(|e| e.low.as_ref()).map(|tier| Self::take_content(tier, content));
            if let Some((image, uv_box)) = cut {
                let record = self.requests.get_mut(handle).unwrap();
                record.image = Some(image);
                record.uv_box = uv_box;
                record.current_quality = Some(TierQuality::Low);
                let held = record.low_total_held;
                if !content.is_all() && held {
                    record.low_total_held = false;
                    if let Some(entry) = self.shots.get_mut(&shot) {
                        entry.low_total = entry.low_total.saturating_sub(1);
                    }
                }
                if !wants_full {
                    self.finish(handle, shot);
                }
            }
        }

        if wants_full {
            let done_already = self.requests.get(handle).is_some_and(|r| r.done);
            if !done_already {
                if let Some(tier) = self.shots.get(&shot).and_then(|e| e.full.as_ref()) {
                    let (image, uv_box) = Self::take_content(tier, content);
                    let record = self.requests.get_mut(handle).unwrap();
                    record.image = Some(image);
                    record.uv_box = uv_box;
                    record.current_quality = Some(TierQuality::Full);
                    if !content.is_all() && record.full_total_held {
                        record.full_total_held = false;
                        if let Some(entry) = self.shots.get_mut(&shot) {
                            entry.full_total = entry.full_total.saturating_sub(1);
                        }
                    }
                    self.finish(handle, shot);
                }
            }
        }
    }

    fn take_content(tier: &CachedTier<T>, content: Content) -> (RequestImage, UvBox) {
        match content {
            Content::All => (RequestImage::Shared(tier.pixels.clone()), tier.uv_box),
            Content::Region { x, y, w, h } => (RequestImage::Cut(cut_region(&tier.pixels, tier.uv_box, x, y, w, h)), UvBox::FULL),
            Content::Centered { cx, cy, sx, sy } => {
                (RequestImage::Cut(cut_centered(&tier.pixels, tier.uv_box, cx, cy, sx, sy)), UvBox::FULL)
            }
        }
    }

    /// Marks `handle` done, releasing the pending counters it still holds.
    fn finish(&mut self, handle: RequestHandle, shot: ShotHandle) {
        let Some(record) = self.requests.get_mut(handle) else { return };
        record.done = true;
        let (low_held, full_held) = (record.low_pending_held, record.full_pending_held);
        record.low_pending_held = false;
        record.full_pending_held = false;
        if let Some(entry) = self.shots.get_mut(&shot) {
            if low_held {
                entry.low_pending = entry.low_pending.saturating_sub(1);
            }
            if full_held {
                entry.full_pending = entry.full_pending.saturating_sub(1);
            }
        }
        let released = low_held as usize + full_held as usize;
        self.pending_requests = self.pending_requests.saturating_sub(released);
    }

    pub fn gpu_ready(&self, handle: RequestHandle) -> Option<GpuReady<T>>
    where
        T: Clone,
    {
        let record = self.requests.get(handle)?;
        if !record.is_ready() {
            return None;
        }
        let entry = self.shots.get(&record.shot)?;
        Some(GpuReady {
            full_tex: entry.full.as_ref().and_then(|t| t.texture.clone()),
            low_tex: entry.low.as_ref().and_then(|t| t.texture.clone()),
            uv_box: record.uv_box,
        })
    }

    pub fn flush_textures(&mut self) {
        for entry in self.shots.values_mut() {
            if let Some(tier) = entry.full.as_mut() {
                tier.texture = None;
            }
            if let Some(tier) = entry.low.as_mut() {
                tier.texture = None;
            }
        }
    }
}

/// Crops a normalised `(x, y, w, h)` region (in the *original* image's
/// frame) out of a letterboxed tier buffer, mapping through `uv_box` to find
/// where the real content lives inside the padded canvas.
fn cut_region(pixels: &image::RgbImage, uv_box: UvBox, x: f64, y: f64, w: f64, h: f64) -> image::RgbImage {
    let (tw, th) = pixels.dimensions();
    let content_w = (uv_box.u1 - uv_box.u0) * tw as f64;
    let content_h = (uv_box.v1 - uv_box.v0) * th as f64;
    let px = (uv_box.u0 * tw as f64 + x.clamp(0.0, 1.0) * content_w).round().max(0.0) as u32;
    let py = (uv_box.v0 * th as f64 + y.clamp(0.0, 1.0) * content_h).round().max(0.0) as u32;
    let pw = (w.clamp(0.0, 1.0) * content_w).round().max(1.0) as u32;
    let ph = (h.clamp(0.0, 1.0) * content_h).round().max(1.0) as u32;
    let pw = pw.min(tw.saturating_sub(px)).max(1);
    let ph = ph.min(th.saturating_sub(py)).max(1);
    image::imageops::crop_imm(pixels, px, py, pw, ph).to_image()
}

/// Crops a `(sx, sy)`-pixel-sized (in original-image pixel units) box
/// centred at normalised `(cx, cy)` out of a letterboxed tier buffer.
fn cut_centered(pixels: &image::RgbImage, uv_box: UvBox, cx: f64, cy: f64, sx: f64, sy: f64) -> image::RgbImage {
    let (tw, th) = pixels.dimensions();
    let content_w = (uv_box.u1 - uv_box.u0) * tw as f64;
    let content_h = (uv_box.v1 - uv_box.v0) * th as f64;
    // sx/sy are in original pixel units; the tier buffer may be a resized
    // version, so scale by the tier's content size relative to itself is
    // not meaningful without the original dimensions — approximate by
    // treating sx/sy as already expressed in the tier's content pixels,
    // which is exact when content_w/content_h equal the original size
    // (the common case: tiers are at least as large as typical ROI asks).
    let ccx = uv_box.u0 * tw as f64 + cx.clamp(0.0, 1.0) * content_w;
    let ccy = uv_box.v0 * th as f64 + cy.clamp(0.0, 1.0) * content_h;
    let half_w = (sx.max(1.0)) / 2.0;
    let half_h = (sy.max(1.0)) / 2.0;
    let px = (ccx - half_w).round().max(0.0) as u32;
    let py = (ccy - half_h).round().max(0.0) as u32;
    let pw = (sx.max(1.0)).round().max(1.0) as u32;
    let ph = (sy.max(1.0)).round().max(1.0) as u32;
    let pw = pw.min(tw.saturating_sub(px)).max(1);
    let ph = ph.min(th.saturating_sub(py)).max(1);
    image::imageops::crop_imm(pixels, px, py, pw, ph).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoStore;

    #[test]
    fn pin_and_unpin_roundtrip() {
        let mut state: CacheState<()> = CacheState::new();
        let mut store = GeoStore::new();
        let shot = store.add_shot("a", 10, 10);

        let handle = state.submit(shot, Quality::Low, Content::All);
        assert_eq!(state.shots.get(&shot).unwrap().low_total, 1);
        assert_eq!(state.shots.get(&shot).unwrap().low_pending, 1);

        state.cancel(handle);
        assert_eq!(state.shots.get(&shot).unwrap().low_total, 0);
        assert_eq!(state.shots.get(&shot).unwrap().low_pending, 0);
    }

    #[test]
    fn cache_too_small_when_every_resident_is_pinned() {
        let mut state: CacheState<()> = CacheState::new();
        let mut store = GeoStore::new();
        let a = store.add_shot("a", 10, 10);
        let b = store.add_shot("b", 10, 10);

        let handle_a = state.submit(a, Quality::Low, Content::All);
        state.install_tier(a, TierQuality::Low, image::RgbImage::new(1, 1), UvBox::FULL, (1, 1), 1).unwrap();
        // `a` stays pinned (it is the only live request), so there is no
        // idle resident at this tier to evict for `b`.
        let err = state.install_tier(b, TierQuality::Low, image::RgbImage::new(1, 1), UvBox::FULL, (1, 1), 1).unwrap_err();
        assert!(matches!(err, CacheError::CacheTooSmall(1)));

        state.cancel(handle_a);
        state.install_tier(b, TierQuality::Low, image::RgbImage::new(1, 1), UvBox::FULL, (1, 1), 1).unwrap();
        assert!(state.shots.get(&a).unwrap().low.is_none());
    }

    #[test]
    fn resolve_satisfies_all_request_immediately_once_resident() {
        let mut state: CacheState<()> = CacheState::new();
        let mut store = GeoStore::new();
        let shot = store.add_shot("a", 10, 10);
        state.install_tier(shot, TierQuality::Low, image::RgbImage::new(4, 4), UvBox::FULL, (4, 4), 32).unwrap();

        let handle = state.submit(shot, Quality::Low, Content::All);
        assert!(state.is_ready(handle));
    }
}
