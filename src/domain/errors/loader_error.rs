//! Loader construction error types.

use thiserror::Error;

/// Errors raised while building an [`ImageLoader`](crate::infrastructure::image::ImageLoader).
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LoaderError {
    #[error("no tokio runtime available: {message}")]
    NoRuntime { message: String },

    #[error("failed to create HTTP client: {message}")]
    HttpClient { message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}
