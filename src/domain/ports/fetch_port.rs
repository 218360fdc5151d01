//! Port definition for remote byte retrieval.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::errors::FetchError;
use crate::domain::stream::RewindableStream;

/// Body of a completed fetch.
#[derive(Debug)]
pub enum FetchedBody {
    /// Bytes were persisted to this path and should be decoded from there.
    Persisted(PathBuf),
    /// Bytes are only available as a once-readable stream.
    Stream(RewindableStream),
}

/// Port for fetching remote images.
#[async_trait]
pub trait FetchPort: Send + Sync {
    /// Retrieves the body behind `url`.
    ///
    /// When `persist_to` is given the bytes are written there as they arrive
    /// and [`FetchedBody::Persisted`] is returned, unless persisting failed.
    async fn fetch(&self, url: &str, persist_to: Option<&Path>) -> Result<FetchedBody, FetchError>;
}
