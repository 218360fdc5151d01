//! In-memory LRU image cache bounded by decoded byte size.

use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, SharedImage};
use crate::domain::ports::ImageCachePort;

/// Default byte budget for decoded images (64 MiB).
pub const DEFAULT_CACHE_BYTES: u64 = 64 * 1024 * 1024;

struct Inner {
    entries: LruCache<CacheKey, SharedImage>,
    bytes: u64,
}

/// In-memory LRU cache for decoded images.
///
/// Entries are weighed by their pixel buffer size; least recently used
/// entries are dropped once the total exceeds the budget.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    max_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn weight(image: &SharedImage) -> u64 {
    image.as_bytes().len() as u64
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `max_bytes` of pixel data.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default budget.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_BYTES)
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            bytes: inner.bytes,
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<SharedImage> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Returns the byte total of all cached images.
    pub fn bytes(&self) -> u64 {
        self.inner.lock().bytes
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("max_bytes", &self.max_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Current pixel bytes held.
    pub bytes: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} KiB), {:.1}% hit rate ({} hits, {} misses)",
            self.size,
            self.bytes / 1024,
            self.hit_rate,
            self.hits,
            self.misses
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, key: &CacheKey) -> Option<SharedImage> {
        let mut inner = self.inner.lock();
        if let Some(img) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn put(&self, key: CacheKey, image: SharedImage) {
        let size = weight(&image);
        if size > self.max_bytes {
            debug!(
                key = %key,
                size,
                max = self.max_bytes,
                "Image larger than memory cache, not storing"
            );
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.put(key.clone(), image) {
            inner.bytes -= weight(&old);
        }
        inner.bytes += size;
        debug!(key = %key, size, total = inner.bytes, "Storing image in memory cache");

        while inner.bytes > self.max_bytes {
            let Some((evicted, img)) = inner.entries.pop_lru() else {
                break;
            };
            inner.bytes -= weight(&img);
            trace!(key = %evicted, "Evicted least recently used image");
        }
    }

    fn evict(&self, key: &CacheKey) {
        let mut inner = self.inner.lock();
        if let Some(img) = inner.entries.pop(key) {
            inner.bytes -= weight(&img);
            debug!(key = %key, "Evicted image from memory cache");
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.bytes = 0;
        debug!("Cleared memory image cache");
    }
}
