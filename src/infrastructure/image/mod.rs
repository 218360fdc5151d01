//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with byte-bounded LRU eviction
//! - Disk caching of fetched bytes
//! - HTTP fetching and sampled decoding
//! - The async load coordinator and its delivery queue

pub mod codec;
pub mod consumer;
pub mod decoder;
pub mod delivery;
pub mod disk_cache;
pub mod fetcher;
pub mod loader;
pub mod memory_cache;
pub mod resources;

pub use codec::RasterCodec;
pub use consumer::{ConsumerHandle, ConsumerTable, position_visible};
pub use decoder::{DecodeInput, Decoder, sample_size};
pub use delivery::{DeliveryQueue, ResultCallback, VisibilityCheck};
pub use disk_cache::DiskImageCache;
pub use fetcher::HttpFetcher;
pub use loader::{ImageLoader, ImageLoaderBuilder, ImageRequest, RequestStatus};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use resources::ResourceDir;
