//! Port definition for images bundled with the application.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::entities::ResourceId;
use crate::domain::errors::CacheError;

/// Port for resolving local resource ids to encoded bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourcePort: Send + Sync {
    /// Loads the encoded bytes of a resource.
    async fn load(&self, id: ResourceId) -> Result<Bytes, CacheError>;
}
