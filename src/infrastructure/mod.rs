//! Infrastructure layer with cache, network and codec adapters.

/// Application configuration.
pub mod config;
/// Image loading, decoding and caching.
pub mod image;

pub use config::{AppConfig, CliArgs, LoaderConfig, LogLevel, StorageManager};
pub use image::{
    CacheStats, ConsumerHandle, ConsumerTable, DeliveryQueue, DiskImageCache, HttpFetcher,
    ImageLoader, ImageRequest, MemoryImageCache, RequestStatus,
};
