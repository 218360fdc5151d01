//! Sampled decoding with bounded out-of-memory recovery.
//!
//! A decode reads the original bounds, picks the largest power-of-two
//! sample size that keeps both axes at or above the requested size, and
//! decodes. When the codec runs out of memory the requested size shrinks by
//! [`SHRINK_FACTOR`] on each axis and the decode is retried, at most
//! `max_attempts` times in total.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::domain::entities::{Dimensions, SharedImage, TargetSize};
use crate::domain::errors::{CodecError, DecodeError};
use crate::domain::ports::ImageCodec;
use crate::domain::stream::RewindableStream;

/// Per-axis shrink applied after each out-of-memory failure.
pub const SHRINK_FACTOR: f64 = 0.75;

/// Default number of decode attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// How much of a stream is read for its bounds before falling back to
/// the whole stream.
pub const DEFAULT_HEADER_WINDOW: usize = 64 * 1024;

/// Encoded input to decode.
#[derive(Debug)]
pub enum DecodeInput {
    /// In-memory bytes.
    Bytes(Bytes),
    /// A file on disk; re-read on every attempt.
    File(PathBuf),
    /// A once-readable stream; retries need it to rewind.
    Stream(RewindableStream),
}

impl DecodeInput {
    fn header_bytes(&mut self, window: usize) -> Result<Bytes, DecodeError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File(path) => read_file(path),
            Self::Stream(stream) => {
                let header = stream
                    .read_prefix(window)
                    .map_err(|e| DecodeError::unsupported(e.to_string()))?;
                stream.rewind()?;
                Ok(Bytes::from(header))
            }
        }
    }

    fn full_bytes(&mut self) -> Result<Bytes, DecodeError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::File(path) => read_file(path),
            Self::Stream(stream) => {
                stream.rewind()?;
                stream
                    .read_remaining()
                    .map(Bytes::from)
                    .map_err(|e| DecodeError::unsupported(e.to_string()))
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Bytes, DecodeError> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|e| DecodeError::unsupported(format!("{}: {e}", path.display())))
}

/// Largest power-of-two sample size keeping `original / sample` at or above
/// `target` on both axes.
#[must_use]
pub fn sample_size(original: Dimensions, target: Dimensions) -> u32 {
    let mut sample = 1u32;
    while let Some(next) = sample.checked_mul(2) {
        if original.width / next < target.width || original.height / next < target.height {
            break;
        }
        sample = next;
    }
    sample
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn shrink(dims: Dimensions) -> Dimensions {
    let scale = |v: u32| ((f64::from(v) * SHRINK_FACTOR) as u32).max(1);
    Dimensions::new(scale(dims.width), scale(dims.height))
}

/// Turns encoded input into a decoded image at a target resolution.
#[derive(Clone)]
pub struct Decoder {
    codec: Arc<dyn ImageCodec>,
    max_attempts: u32,
    header_window: usize,
}

impl Decoder {
    /// Creates a decoder over `codec`.
    #[must_use]
    pub fn new(codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            codec,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            header_window: DEFAULT_HEADER_WINDOW,
        }
    }

    /// Sets the attempt ceiling. Values below one are treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets how many stream bytes are read for bounds.
    #[must_use]
    pub const fn with_header_window(mut self, bytes: usize) -> Self {
        self.header_window = bytes;
        self
    }

    /// Decodes `input` for `target`. Blocking.
    ///
    /// # Errors
    /// - [`DecodeError::Unsupported`] if the input is not an image.
    /// - [`DecodeError::StreamNotReseekable`] if a stream had to be re-read
    ///   but no longer fits its rewind window.
    /// - [`DecodeError::ExhaustedRetries`] if every attempt ran out of memory.
    pub fn decode(
        &self,
        mut input: DecodeInput,
        target: TargetSize,
    ) -> Result<SharedImage, DecodeError> {
        let window = match &input {
            DecodeInput::Stream(stream) => self.header_window.min(stream.mark_limit()),
            _ => self.header_window,
        };
        let header = input.header_bytes(window)?;
        let (original, mut prefetched) = match self.codec.read_dimensions(&header) {
            Ok(original) => (original, None),
            // bounds may sit past large metadata segments
            Err(_) if matches!(input, DecodeInput::Stream(_)) && header.len() >= window => {
                trace!(window, "Bounds not within header window, reading whole stream");
                let data = input.full_bytes()?;
                (self.codec.read_dimensions(&data)?, Some(data))
            }
            Err(e) => return Err(e.into()),
        };
        drop(header);

        let mut requested = target.resolve(original);

        for attempt in 1..=self.max_attempts {
            let sample = requested.map_or(1, |r| sample_size(original, r));
            trace!(attempt, %original, ?requested, sample, "Decoding");

            let data = match prefetched.take() {
                Some(data) => data,
                None => input.full_bytes()?,
            };
            match self.codec.decode(&data, sample) {
                Ok(image) => return Ok(image),
                Err(CodecError::OutOfMemory { requested: bytes }) => {
                    let next = shrink(requested.unwrap_or(original));
                    debug!(
                        attempt,
                        sample,
                        bytes,
                        next = %next,
                        "Decode out of memory, shrinking target"
                    );
                    requested = Some(next);
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(attempts = self.max_attempts, %original, "Giving up on decode");
        Err(DecodeError::ExhaustedRetries {
            attempts: self.max_attempts,
        })
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("max_attempts", &self.max_attempts)
            .field("header_window", &self.header_window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::codec::RasterCodec;
    use crate::infrastructure::image::codec::tests::png_bytes;
    use parking_lot::Mutex;
    use std::io::Cursor;
    use test_case::test_case;

    /// Codec with fixed bounds that runs out of memory for samples below
    /// `min_sample`, recording every sample it was asked for.
    struct ScriptedCodec {
        bounds: Dimensions,
        min_sample: u32,
        samples: Mutex<Vec<u32>>,
    }

    impl ScriptedCodec {
        fn new(bounds: Dimensions, min_sample: u32) -> Arc<Self> {
            Arc::new(Self {
                bounds,
                min_sample,
                samples: Mutex::new(Vec::new()),
            })
        }
    }

    impl ImageCodec for ScriptedCodec {
        fn read_dimensions(&self, _data: &[u8]) -> Result<Dimensions, CodecError> {
            Ok(self.bounds)
        }

        fn decode(&self, _data: &[u8], sample: u32) -> Result<SharedImage, CodecError> {
            self.samples.lock().push(sample);
            if sample < self.min_sample {
                return Err(CodecError::OutOfMemory { requested: 1 });
            }
            Ok(Arc::new(image::DynamicImage::new_rgb8(
                self.bounds.width / sample,
                self.bounds.height / sample,
            )))
        }
    }

    #[test_case(4000, 3000, 400, 300 => 8 ; "list_thumbnail")]
    #[test_case(4000, 3000, 500, 375 => 8 ; "exact_fit")]
    #[test_case(4000, 3000, 501, 375 => 4 ; "just_above")]
    #[test_case(100, 100, 200, 200 => 1 ; "upscale_request")]
    #[test_case(1024, 64, 16, 16 => 4 ; "limited_by_short_axis")]
    #[test_case(u32::MAX, u32::MAX, 1, 1 => 1 << 31 ; "no_overflow")]
    fn test_sample_size(w: u32, h: u32, tw: u32, th: u32) -> u32 {
        sample_size(Dimensions::new(w, h), Dimensions::new(tw, th))
    }

    #[test]
    fn test_downsample_4000x3000_to_400x300() {
        let codec = ScriptedCodec::new(Dimensions::new(4000, 3000), 1);
        let decoder = Decoder::new(codec.clone());

        let img = decoder
            .decode(DecodeInput::Bytes(Bytes::new()), TargetSize::new(400, 300))
            .unwrap();

        assert_eq!((img.width(), img.height()), (500, 375));
        assert!(img.width() >= 400 && img.height() >= 300);
        assert_eq!(*codec.samples.lock(), vec![8]);
    }

    #[test]
    fn test_single_axis_derives_other_from_aspect() {
        let codec = ScriptedCodec::new(Dimensions::new(4000, 3000), 1);
        let decoder = Decoder::new(codec.clone());

        decoder
            .decode(DecodeInput::Bytes(Bytes::new()), TargetSize::width(400))
            .unwrap();
        assert_eq!(*codec.samples.lock(), vec![8]);
    }

    #[test]
    fn test_unspecified_target_decodes_full_size() {
        let codec = ScriptedCodec::new(Dimensions::new(640, 480), 1);
        let decoder = Decoder::new(codec.clone());

        let img = decoder
            .decode(DecodeInput::Bytes(Bytes::new()), TargetSize::ORIGINAL)
            .unwrap();
        assert_eq!((img.width(), img.height()), (640, 480));
    }

    #[test]
    fn test_oom_shrinks_until_success() {
        // Full 2048x2048: attempt 1 sample 1 fails, then targets of
        // 1536 (sample 1), 1152 (sample 1), 864 (sample 2).
        let codec = ScriptedCodec::new(Dimensions::new(2048, 2048), 2);
        let decoder = Decoder::new(codec.clone()).with_max_attempts(6);

        let img = decoder
            .decode(DecodeInput::Bytes(Bytes::new()), TargetSize::ORIGINAL)
            .unwrap();
        assert_eq!(img.width(), 1024);
        assert_eq!(*codec.samples.lock(), vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_persistent_oom_terminates() {
        let codec = ScriptedCodec::new(Dimensions::new(4000, 3000), u32::MAX);
        let decoder = Decoder::new(codec.clone()).with_max_attempts(5);

        let err = decoder
            .decode(DecodeInput::Bytes(Bytes::new()), TargetSize::new(400, 300))
            .unwrap_err();

        assert!(matches!(err, DecodeError::ExhaustedRetries { attempts: 5 }));
        assert_eq!(codec.samples.lock().len(), 5);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let codec = ScriptedCodec::new(Dimensions::new(10, 10), u32::MAX);
        let decoder = Decoder::new(codec.clone()).with_max_attempts(0);

        assert!(decoder
            .decode(DecodeInput::Bytes(Bytes::new()), TargetSize::ORIGINAL)
            .is_err());
        assert_eq!(codec.samples.lock().len(), 1);
    }

    #[test]
    fn test_stream_retry_beyond_mark_is_not_reseekable() {
        let codec = ScriptedCodec::new(Dimensions::new(256, 256), u32::MAX);
        let decoder = Decoder::new(codec.clone()).with_header_window(4);
        let stream = RewindableStream::new(Cursor::new(vec![0u8; 100]), 16);

        let err = decoder
            .decode(DecodeInput::Stream(stream), TargetSize::ORIGINAL)
            .unwrap_err();

        assert!(err.is_not_reseekable());
        assert_eq!(codec.samples.lock().len(), 1);
    }

    #[test]
    fn test_stream_within_mark_can_retry() {
        let codec = ScriptedCodec::new(Dimensions::new(256, 256), 2);
        let decoder = Decoder::new(codec.clone());
        let stream = RewindableStream::new(Cursor::new(vec![0u8; 100]), 1024);

        let img = decoder
            .decode(DecodeInput::Stream(stream), TargetSize::ORIGINAL)
            .unwrap();
        assert_eq!(img.width(), 128);
    }

    /// Encodes a blank JPEG and inserts `segments` APP1 blocks of
    /// `segment_len` zero bytes right after the start-of-image marker.
    fn jpeg_with_app_segments(
        width: u32,
        height: u32,
        segments: usize,
        segment_len: u16,
    ) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut encoded = Cursor::new(Vec::new());
        img.write_to(&mut encoded, image::ImageFormat::Jpeg).unwrap();
        let encoded = encoded.into_inner();

        let mut out = encoded[..2].to_vec();
        for _ in 0..segments {
            out.extend_from_slice(&[0xFF, 0xE1]);
            out.extend_from_slice(&(segment_len + 2).to_be_bytes());
            out.extend(std::iter::repeat_n(0u8, usize::from(segment_len)));
        }
        out.extend_from_slice(&encoded[2..]);
        out
    }

    #[test]
    fn test_stream_bounds_past_header_window() {
        let data = jpeg_with_app_segments(32, 24, 2, 40_000);
        assert!(data.len() > DEFAULT_HEADER_WINDOW);
        let decoder = Decoder::new(Arc::new(RasterCodec::default()));
        let stream = RewindableStream::new(Cursor::new(data), 1 << 20);

        let img = decoder
            .decode(DecodeInput::Stream(stream), TargetSize::ORIGINAL)
            .unwrap();
        assert_eq!((img.width(), img.height()), (32, 24));
    }

    #[test]
    fn test_garbage_stream_larger_than_window_is_unsupported() {
        let decoder = Decoder::new(Arc::new(RasterCodec::default())).with_header_window(16);
        let stream = RewindableStream::new(Cursor::new(vec![0x42u8; 256]), 1024);

        let err = decoder
            .decode(DecodeInput::Stream(stream), TargetSize::ORIGINAL)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { .. }));
    }

    #[test]
    fn test_real_png_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.img");
        std::fs::write(&path, png_bytes(64, 48)).unwrap();

        let decoder = Decoder::new(Arc::new(RasterCodec::default()));
        let img = decoder
            .decode(DecodeInput::File(path), TargetSize::new(16, 12))
            .unwrap();
        assert_eq!((img.width(), img.height()), (16, 12));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let decoder = Decoder::new(Arc::new(RasterCodec::default()));
        let err = decoder
            .decode(
                DecodeInput::Bytes(Bytes::from_static(b"<html>404</html>")),
                TargetSize::ORIGINAL,
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { .. }));
    }

    #[test]
    fn test_missing_file_is_unsupported() {
        let decoder = Decoder::new(Arc::new(RasterCodec::default()));
        let err = decoder
            .decode(
                DecodeInput::File(PathBuf::from("/nonexistent/pixcache/x.img")),
                TargetSize::ORIGINAL,
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported { .. }));
    }
}
