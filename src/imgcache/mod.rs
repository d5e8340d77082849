// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! IMGCACHE: a two-tier asynchronous image cache.
//!
//! A dedicated loader thread decodes and letterboxes source images off the
//! calling thread; callers [`ImageCache::submit`] a request describing a shot,
//! [`Quality`], and [`Content`], get back a [`RequestHandle`], and later poll
//! [`ImageCache::is_ready`]. All shared state lives behind a single
//! [`std::sync::Mutex`], with a [`std::sync::Condvar`] to wake the loader
//! early on submission and to wake it again after every decode so it can
//! resolve whatever else that tier satisfies; the lock is dropped for the
//! actual (I/O-bound) decode so it never blocks submitters.
//!
//! A decode failure (missing file, corrupt data) is never surfaced to the
//! caller: the worker substitutes a placeholder image and logs a warning, so
//! a broken source never wedges [`ImageCache::is_ready`] forever.
//!
//! GPU upload is out of scope here: [`GpuTextureUploader`] is the capability
//! boundary a real renderer implements. [`ImageCache::gpu_upload`] is the
//! method that calls into it, meant to run on the render thread;
//! [`ImageCache::flush_textures`] zeroes every texture id after a context
//! loss (e.g. a window resize) without touching the CPU buffers, so a
//! subsequent `gpu_upload` recreates them.

mod error;
mod gpu;
mod request;
mod state;
mod worker;

pub use error::CacheError;
pub use gpu::GpuTextureUploader;
pub use request::{Content, GpuReady, Quality, RequestHandle, UvBox};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::config::Config;
use crate::geo::ShotHandle;
use state::CacheState;

/// The cache itself. Internally everything is already behind `Arc`, so it is
/// cheap to wrap in its own `Arc` if multiple owners need it.
pub struct ImageCache<U: GpuTextureUploader> {
    state: Arc<Mutex<CacheState<U::Texture>>>,
    cond: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    uploader: Arc<U>,
    config: Config,
    loader: Option<JoinHandle<()>>,
}

impl<U: GpuTextureUploader + 'static> ImageCache<U> {
    /// Spawns the loader thread and returns the cache, or
    /// [`CacheError::ThreadSpawnFailed`] if the OS refused to create the
    /// thread.
    pub fn new(config: Config, uploader: U) -> Result<Self, CacheError> {
        let config = config.repair();
        let state = Arc::new(Mutex::new(CacheState::new()));
        let cond = Arc::new(Condvar::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let loader = worker::spawn(state.clone(), cond.clone(), shutdown.clone(), config.clone())
            .map_err(worker::report_spawn_failure)?;
        Ok(Self {
            state,
            cond,
            shutdown,
            uploader: Arc::new(uploader),
            config,
            loader: Some(loader),
        })
    }

    /// Registers `path` as `shot`'s source file (first registration wins;
    /// later calls are no-ops) and submits a request for its pixels at
    /// `quality`/`content`. Returns [`CacheError::TooManyRequests`] if
    /// [`crate::Config::max_requests`] outstanding requests are already
    /// live.
    pub fn submit(&self, shot: ShotHandle, quality: Quality, content: Content, path: impl Into<String>) -> Result<RequestHandle, CacheError> {
        let mut guard = self.state.lock().unwrap();
        if guard.pending_requests >= self.config.max_requests {
            return Err(CacheError::TooManyRequests(self.config.max_requests));
        }
        if guard.file_of(shot).is_none() {
            guard.set_file(shot, path.into());
        }
        let handle = guard.submit(shot, quality, content);
        guard.pending_requests += 1;
        drop(guard);
        self.cond.notify_all();
        Ok(handle)
    }

    /// Releases `handle`, making the tiers it was holding eligible for
    /// eviction once nothing else needs them.
    pub fn cancel(&self, handle: RequestHandle) {
        let mut guard = self.state.lock().unwrap();
        guard.cancel(handle);
    }

    /// True once `handle`'s requested content is available: for
    /// [`Quality::Low`]/[`Quality::Full`] that means the matching tier has
    /// decoded; for [`Quality::Continuous`] it goes true as soon as Low
    /// lands and stays true as Full later replaces it.
    pub fn is_ready(&self, handle: RequestHandle) -> bool {
        self.state.lock().unwrap().is_ready(handle)
    }

    /// The source image's pixel dimensions, known once any tier for its shot
    /// has decoded.
    pub fn dimensions(&self, handle: RequestHandle) -> Option<(u32, u32)> {
        self.state.lock().unwrap().dimensions(handle)
    }

    /// `handle`'s GPU-side readiness: the uploaded texture(s) for whichever
    /// tier(s) [`Self::gpu_upload`] has processed, plus the UV box to sample
    /// within them. `None` until [`Self::is_ready`] is true.
    pub fn gpu_ready(&self, handle: RequestHandle) -> Option<GpuReady<U::Texture>> {
        self.state.lock().unwrap().gpu_ready(handle)
    }

    /// Uploads whichever of `handle`'s shot's resident tiers have no texture
    /// yet. Idempotent: a tier that already has one is left untouched. Must
    /// be called from the thread the [`GpuTextureUploader`] expects to run
    /// on.
    pub fn gpu_upload(&self, handle: RequestHandle) {
        let mut guard = self.state.lock().unwrap();
        let Some(shot) = guard.requests.get(handle).map(|r| r.shot) else {
            return;
        };
        let Some(entry) = guard.shots.get_mut(&shot) else {
            return;
        };
        if let Some(tier) = entry.full.as_mut() {
            if tier.texture.is_none() {
                tier.texture = Some(self.uploader.create_texture(&tier.pixels));
            }
        }
        if let Some(tier) = entry.low.as_mut() {
            if tier.texture.is_none() {
                tier.texture = Some(self.uploader.create_texture(&tier.pixels));
            }
        }
    }

    /// Marks every resident tier's texture as gone, without touching the CPU
    /// buffers backing them. Called after a GL context loss (e.g. on window
    /// resize); a subsequent [`Self::gpu_upload`] recreates textures from
    /// the still-resident pixels.
    pub fn flush_textures(&self) {
        self.state.lock().unwrap().flush_textures();
    }
}

impl<U: GpuTextureUploader> Drop for ImageCache<U> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.cond.notify_all();
        if let Some(handle) = self.loader.take() {
            let _ = handle.join();
        }
    }
}
