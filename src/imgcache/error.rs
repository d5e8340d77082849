// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Errors produced by [`crate::imgcache`].

/// Failure modes of the asynchronous image cache.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// More requests were outstanding than [`crate::Config::max_requests`]
    /// allows.
    #[error("too many outstanding cache requests (limit {0})")]
    TooManyRequests(usize),

    /// Every resident image at this tier is currently pinned by a live
    /// request, so nothing could be evicted to make room for a new one.
    /// Raise `cache_full_count`/`cache_low_count` or release some requests.
    #[error("image cache of {0} slots is too small for the images currently in use")]
    CacheTooSmall(u32),

    /// The background loader thread could not be spawned.
    #[error("failed to spawn the image loader thread: {0}")]
    ThreadSpawnFailed(std::io::Error),
}
