//! Raster codec backed by the `image` crate.

use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{ImageError, ImageReader, Limits};
use tracing::trace;

use crate::domain::entities::{Dimensions, SharedImage};
use crate::domain::errors::CodecError;
use crate::domain::ports::ImageCodec;

/// Default budget for a decoded output buffer (48 MiB).
pub const DEFAULT_MAX_DECODED_BYTES: u64 = 48 * 1024 * 1024;

/// Decodes PNG, JPEG and WebP data.
///
/// The output budget plays the role of the heap: a decode whose sampled
/// RGBA buffer would exceed it reports [`CodecError::OutOfMemory`], as does
/// any allocation the underlying decoder refuses.
#[derive(Debug, Clone)]
pub struct RasterCodec {
    max_decoded_bytes: u64,
    max_alloc: Option<u64>,
}

impl RasterCodec {
    /// Creates a codec with the given output budget.
    #[must_use]
    pub const fn new(max_decoded_bytes: u64) -> Self {
        Self {
            max_decoded_bytes,
            max_alloc: None,
        }
    }

    /// Caps allocations made by the underlying decoder.
    #[must_use]
    pub const fn with_max_alloc(mut self, bytes: u64) -> Self {
        self.max_alloc = Some(bytes);
        self
    }

    fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, CodecError> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| CodecError::Io {
                message: e.to_string(),
            })
    }
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECODED_BYTES)
    }
}

fn map_image_error(err: ImageError, requested: u64) -> CodecError {
    match err {
        ImageError::Limits(_) => CodecError::OutOfMemory { requested },
        ImageError::IoError(e) => CodecError::Io {
            message: e.to_string(),
        },
        other => CodecError::unsupported(other.to_string()),
    }
}

impl ImageCodec for RasterCodec {
    fn read_dimensions(&self, data: &[u8]) -> Result<Dimensions, CodecError> {
        let reader = Self::reader(data)?;
        if reader.format().is_none() {
            return Err(CodecError::unsupported("unrecognized image format"));
        }
        let (width, height) = reader.into_dimensions().map_err(|e| map_image_error(e, 0))?;
        Ok(Dimensions::new(width, height))
    }

    fn decode(&self, data: &[u8], sample_size: u32) -> Result<SharedImage, CodecError> {
        let original = self.read_dimensions(data)?;
        let sample = sample_size.max(1);
        let output = Dimensions::new(
            (original.width / sample).max(1),
            (original.height / sample).max(1),
        );

        let requested = output.rgba_bytes();
        if requested > self.max_decoded_bytes {
            return Err(CodecError::OutOfMemory { requested });
        }

        let mut reader = Self::reader(data)?;
        if let Some(max_alloc) = self.max_alloc {
            let mut limits = Limits::default();
            limits.max_alloc = Some(max_alloc);
            reader.limits(limits);
        }
        let decoded = reader
            .decode()
            .map_err(|e| map_image_error(e, original.rgba_bytes()))?;

        trace!(%original, %output, sample, "Decoded image");

        if sample == 1 {
            return Ok(Arc::new(decoded));
        }
        Ok(Arc::new(decoded.resize_exact(
            output.width,
            output.height,
            FilterType::Triangle,
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encodes a blank RGB image as PNG.
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_read_dimensions_from_header() {
        let codec = RasterCodec::default();
        let dims = codec.read_dimensions(&png_bytes(64, 32)).unwrap();
        assert_eq!(dims, Dimensions::new(64, 32));
    }

    #[test]
    fn test_read_dimensions_rejects_garbage() {
        let codec = RasterCodec::default();
        let err = codec.read_dimensions(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::Unsupported { .. }));
    }

    #[test]
    fn test_decode_applies_sample_size() {
        let codec = RasterCodec::default();
        let img = codec.decode(&png_bytes(64, 32), 4).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[test]
    fn test_decode_over_budget_is_out_of_memory() {
        // 64x64 RGBA = 16 KiB, 32x32 = 4 KiB
        let codec = RasterCodec::new(8 * 1024);
        let data = png_bytes(64, 64);

        let err = codec.decode(&data, 1).unwrap_err();
        assert!(matches!(err, CodecError::OutOfMemory { requested: 16384 }));
        assert!(codec.decode(&data, 2).is_ok());
    }
}
