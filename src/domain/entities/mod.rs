//! Domain entity definitions.

mod image;

pub use image::{
    CacheKey, Dimensions, ImageOrigin, ImageResult, ImageSource, ResourceId, SharedImage,
    TargetSize,
};
