//! Domain types for image requests and results.

use std::sync::Arc;

/// A decoded image shared read-only between cache slots and consumers.
pub type SharedImage = Arc<image::DynamicImage>;

/// Opaque identity of one logical image.
///
/// Two requests carrying the same key are the same resource for caching and
/// deduplication, whatever their source says.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new `CacheKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable filesystem-safe digest of the key.
    ///
    /// The first 16 bytes of a SHA-256, hex encoded.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identifier of an image bundled with the application.
pub type ResourceId = u32;

/// Where the bytes of a requested image come from.
#[derive(Clone)]
pub enum ImageSource {
    /// Remote HTTP(S) resource.
    RemoteUrl(String),
    /// Image bundled with the application.
    LocalResource(ResourceId),
    /// Already decoded image; only needs caching.
    Raw(SharedImage),
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteUrl(url) => f.debug_tuple("RemoteUrl").field(url).finish(),
            Self::LocalResource(id) => f.debug_tuple("LocalResource").field(id).finish(),
            Self::Raw(img) => f
                .debug_struct("Raw")
                .field("width", &img.width())
                .field("height", &img.height())
                .finish(),
        }
    }
}

impl From<&str> for ImageSource {
    fn from(url: &str) -> Self {
        Self::RemoteUrl(url.to_string())
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Creates dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes an RGBA8 buffer of this size occupies.
    #[must_use]
    pub const fn rgba_bytes(self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Requested decode resolution. `None` on an axis means unspecified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetSize {
    /// Requested width.
    pub width: Option<u32>,
    /// Requested height.
    pub height: Option<u32>,
}

impl TargetSize {
    /// Decode at full resolution.
    pub const ORIGINAL: Self = Self {
        width: None,
        height: None,
    };

    /// Both axes requested. Zero counts as unspecified.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width: if width == 0 { None } else { Some(width) },
            height: if height == 0 { None } else { Some(height) },
        }
    }

    /// Only the width is requested; height follows the aspect ratio.
    #[must_use]
    pub const fn width(width: u32) -> Self {
        Self::new(width, 0)
    }

    /// Only the height is requested; width follows the aspect ratio.
    #[must_use]
    pub const fn height(height: u32) -> Self {
        Self::new(0, height)
    }

    /// Returns true if neither axis is requested.
    #[must_use]
    pub const fn is_unspecified(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }

    /// Fills unspecified axes from `original`, preserving its aspect ratio.
    ///
    /// Returns `None` when both axes are unspecified.
    #[must_use]
    pub fn resolve(&self, original: Dimensions) -> Option<Dimensions> {
        let ow = u64::from(original.width.max(1));
        let oh = u64::from(original.height.max(1));
        let (w, h) = match (self.width, self.height) {
            (None, None) => return None,
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, scale_axis(w, oh, ow)),
            (None, Some(h)) => (scale_axis(h, ow, oh), h),
        };
        Some(Dimensions::new(w.max(1), h.max(1)))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn scale_axis(known: u32, numerator: u64, denominator: u64) -> u32 {
    (u64::from(known) * numerator / denominator).min(u64::from(u32::MAX)) as u32
}

/// Where a delivered image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Memory cache hit.
    Memory,
    /// Decoded from the disk cache.
    Disk,
    /// Downloaded from the network.
    Network,
    /// Decoded from a bundled resource.
    Resource,
    /// Supplied already decoded by the caller.
    Raw,
}

impl std::fmt::Display for ImageOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
            Self::Resource => write!(f, "resource"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// Outcome handed to a consumer callback.
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// Key the result resolves.
    pub key: CacheKey,
    /// The image, or `None` if it could not be obtained.
    pub image: Option<SharedImage>,
    /// Origin of the image, if any.
    pub origin: Option<ImageOrigin>,
    /// True if the consumer's display target was updated.
    pub applied: bool,
}

impl ImageResult {
    /// Returns true if an image was obtained.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.image.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_hex() {
        let key = CacheKey::new("https://example.com/image.png");
        assert_eq!(key.digest(), CacheKey::new("https://example.com/image.png").digest());
        assert_eq!(key.digest().len(), 32);
        assert!(key.digest().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key.digest(), CacheKey::new("b.png").digest());
    }

    #[test]
    fn test_target_zero_means_unspecified() {
        assert!(TargetSize::new(0, 0).is_unspecified());
        assert_eq!(TargetSize::new(0, 0), TargetSize::ORIGINAL);
        assert_eq!(TargetSize::width(100).height, None);
    }

    #[test]
    fn test_resolve_preserves_aspect_ratio() {
        let original = Dimensions::new(4000, 3000);
        assert_eq!(
            TargetSize::width(400).resolve(original),
            Some(Dimensions::new(400, 300))
        );
        assert_eq!(
            TargetSize::height(300).resolve(original),
            Some(Dimensions::new(400, 300))
        );
        assert_eq!(TargetSize::ORIGINAL.resolve(original), None);
    }

    #[test]
    fn test_resolve_never_yields_zero() {
        let original = Dimensions::new(10_000, 1);
        let resolved = TargetSize::width(5).resolve(original);
        assert_eq!(resolved, Some(Dimensions::new(5, 1)));
    }
}
