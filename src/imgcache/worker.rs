// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! The background loader thread: picks the shot with the most pending
//! demand, decodes and letterboxes one tier off the lock, and writes the
//! result back under it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use image::imageops::FilterType;
use log::{error, trace, warn};

use crate::config::Config;
use crate::imgcache::error::CacheError;
use crate::imgcache::request::{TierQuality, UvBox};
use crate::imgcache::state::CacheState;

/// A mid-grey placeholder substituted for a source image that failed to
/// decode, so a broken or missing file never surfaces as an error to a
/// caller waiting on [`crate::imgcache::ImageCache::is_ready`].
fn substitute_image(side: u32) -> image::RgbImage {
    image::RgbImage::from_pixel(side.max(1), side.max(1), image::Rgb([128, 128, 128]))
}

/// Decodes `path` and letterboxes it into a `target`×`target` square canvas,
/// preserving aspect ratio and reporting the real-content sub-rectangle as a
/// [`UvBox`]. Never fails: decode errors fall back to [`substitute_image`].
fn decode_and_letterbox(path: &str, target: u32) -> (image::RgbImage, UvBox, (u32, u32)) {
    let decoded = match image::open(path) {
        Ok(img) => img.to_rgb8(),
        Err(source) => {
            warn!("failed to decode {}: {}; substituting a placeholder", path, source);
            return (substitute_image(target), UvBox::FULL, (target, target));
        }
    };
    let (iw, ih) = decoded.dimensions();
    let scale = target as f64 / iw.max(ih).max(1) as f64;
    let nw = ((iw as f64 * scale).round() as u32).clamp(1, target);
    let nh = ((ih as f64 * scale).round() as u32).clamp(1, target);
    let resized = if nw == iw && nh == ih && iw == target && ih == target {
        decoded
    } else {
        image::imageops::resize(&decoded, nw, nh, FilterType::Triangle)
    };

    let mut canvas = image::RgbImage::from_pixel(target, target, image::Rgb([0, 0, 0]));
    let ox = (target - nw) / 2;
    let oy = (target - nh) / 2;
    image::imageops::replace(&mut canvas, &resized, ox as i64, oy as i64);

    let uv_box = UvBox {
        u0: ox as f64 / target as f64,
        v0: oy as f64 / target as f64,
        u1: (ox + nw) as f64 / target as f64,
        v1: (oy + nh) as f64 / target as f64,
    };
    (canvas, uv_box, (iw, ih))
}

/// Spawns the loader thread. It services one tier decode per iteration,
/// waking early whenever [`Condvar::notify_all`] is called (on submission or
/// shutdown) and otherwise polling at [`Config::poll_interval_ms`].
pub(crate) fn spawn<T: Send + 'static>(
    state: Arc<Mutex<CacheState<T>>>,
    cond: Arc<Condvar>,
    shutdown: Arc<AtomicBool>,
    config: Config,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("insight3d-imgcache".into())
        .spawn(move || run(state, cond, shutdown, config))
}

fn run<T: Send + 'static>(state: Arc<Mutex<CacheState<T>>>, cond: Arc<Condvar>, shutdown: Arc<AtomicBool>, config: Config) {
    let poll = Duration::from_millis(config.poll_interval_ms.max(1));
    loop {
        let job = {
            let mut guard = state.lock().unwrap();
            loop {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                if let Some(shot) = guard.shot_demand() {
                    if let Some(tier) = guard.next_tier_to_decode(shot) {
                        if let Some(file) = guard.file_of(shot) {
                            break Some((shot, tier, file));
                        }
                    }
                }
                let (next_guard, result) = cond.wait_timeout(guard, poll).unwrap();
                guard = next_guard;
                if result.timed_out() && guard.shot_demand().is_none() {
                    break None;
                }
            }
        };

        let Some((shot, tier, path)) = job else {
            continue;
        };

        let target = match tier {
            TierQuality::Full => config.full_size,
            TierQuality::Low => config.low_size,
        };
        let (pixels, uv_box, source_dims) = decode_and_letterbox(&path, target);
        trace!("decoded {:?} at {:?} ({}x{})", shot, tier, pixels.width(), pixels.height());

        let mut guard = state.lock().unwrap();
        let capacity = match tier {
            TierQuality::Full => config.cache_full_count,
            TierQuality::Low => config.cache_low_count,
        };
        if let Err(err) = guard.install_tier(shot, tier, pixels, uv_box, source_dims, capacity) {
            warn!("dropping decoded {:?} tier for {:?}: {}", tier, shot, err);
            drop(guard);
            cond.notify_all();
            continue;
        }
        let pending: Vec<_> = guard.requests.iter().map(|(h, _)| h).collect();
        for handle in pending {
            guard.resolve_request(handle);
        }
        drop(guard);
        cond.notify_all();
    }
}

pub(crate) fn report_spawn_failure(err: std::io::Error) -> CacheError {
    error!("failed to spawn the image loader thread: {err}");
    CacheError::ThreadSpawnFailed(err)
}
