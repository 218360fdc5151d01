mod codec_port;
mod consumer_port;
mod fetch_port;
mod image_cache_port;
mod resource_port;

pub use codec_port::ImageCodec;
pub use consumer_port::{ImageTarget, ProgressIndicator};
pub use fetch_port::{FetchPort, FetchedBody};
pub use image_cache_port::ImageCachePort;
pub use resource_port::ResourcePort;

#[cfg(test)]
pub mod mocks {
    pub use super::resource_port::MockResourcePort;
}
