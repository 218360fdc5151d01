//! Port definition for in-memory image caching.

use crate::domain::entities::{CacheKey, SharedImage};

/// Port for memory caching of decoded images.
///
/// Implementations must be thread-safe and must not block on I/O: the loader
/// consults the cache synchronously from its `request` path.
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image from the cache, promoting it as recently used.
    /// A miss is not an error.
    fn get(&self, key: &CacheKey) -> Option<SharedImage>;

    /// Stores an image in the cache, evicting least recently used entries if needed.
    fn put(&self, key: CacheKey, image: SharedImage);

    /// Removes an image from the cache.
    fn evict(&self, key: &CacheKey);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    fn clear(&self);
}
