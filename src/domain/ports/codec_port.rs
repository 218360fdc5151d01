//! Port definition for the external image codec.

use crate::domain::entities::{Dimensions, SharedImage};
use crate::domain::errors::CodecError;

/// Image codec capability.
///
/// Methods are blocking and run on the blocking thread pool.
pub trait ImageCodec: Send + Sync {
    /// Reads the image dimensions without materializing pixels.
    ///
    /// # Errors
    /// Returns [`CodecError::Unsupported`] if the data is not an image.
    fn read_dimensions(&self, data: &[u8]) -> Result<Dimensions, CodecError>;

    /// Decodes `data`, reducing each axis by `sample_size` (a power of two).
    ///
    /// # Errors
    /// Returns [`CodecError::OutOfMemory`] when the decode would exceed the
    /// codec's allocation budget.
    fn decode(&self, data: &[u8], sample_size: u32) -> Result<SharedImage, CodecError>;
}
