//! Decode error types.

use thiserror::Error;

/// Failure reported by an image codec for a single attempt.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum CodecError {
    #[error("unsupported image data: {reason}")]
    Unsupported { reason: String },

    #[error("insufficient memory to decode ({requested} bytes requested)")]
    OutOfMemory { requested: u64 },

    #[error("i/o error while decoding: {message}")]
    Io { message: String },
}

impl CodecError {
    /// Creates unsupported error.
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}

/// Failure of a complete decode, including retries.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum DecodeError {
    #[error("not a decodable image: {reason}")]
    Unsupported { reason: String },

    #[error("stream cannot be rewound after {consumed} bytes; decode from a cached file instead")]
    StreamNotReseekable { consumed: usize },

    #[error("decode still out of memory after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
}

impl DecodeError {
    /// Creates unsupported error.
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// Returns true if the input could not be re-read.
    #[must_use]
    pub const fn is_not_reseekable(&self) -> bool {
        matches!(self, Self::StreamNotReseekable { .. })
    }
}

impl From<CodecError> for DecodeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Unsupported { reason } => Self::Unsupported { reason },
            CodecError::Io { message } => Self::Unsupported { reason: message },
            CodecError::OutOfMemory { .. } => Self::ExhaustedRetries { attempts: 1 },
        }
    }
}
