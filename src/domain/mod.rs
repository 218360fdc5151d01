//! Domain layer with core image types, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;
/// Rewindable byte streams.
pub mod stream;

pub use entities::{CacheKey, ImageResult, ImageSource, SharedImage, TargetSize};
pub use errors::{CacheError, DecodeError, FetchError, LoaderError};
pub use stream::RewindableStream;
