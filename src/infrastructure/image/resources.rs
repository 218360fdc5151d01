//! Bundled images addressed by numeric id.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::trace;

use crate::domain::entities::ResourceId;
use crate::domain::errors::CacheError;
use crate::domain::ports::ResourcePort;

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Resolves resource `N` to `<root>/N` or `<root>/N.<ext>`.
#[derive(Debug, Clone)]
pub struct ResourceDir {
    root: PathBuf,
}

impl ResourceDir {
    /// Creates a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn candidates(&self, id: ResourceId) -> impl Iterator<Item = PathBuf> + '_ {
        let bare = self.root.join(id.to_string());
        std::iter::once(bare.clone())
            .chain(EXTENSIONS.iter().map(move |ext| bare.with_extension(ext)))
    }
}

#[async_trait]
impl ResourcePort for ResourceDir {
    async fn load(&self, id: ResourceId) -> Result<Bytes, CacheError> {
        for path in self.candidates(id) {
            if let Ok(data) = fs::read(&path).await {
                trace!(id, path = %path.display(), "Loaded resource");
                return Ok(Bytes::from(data));
            }
        }
        Err(CacheError::IoError(format!(
            "resource {id} not found under {}",
            self.root.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_bare_and_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("7"), b"bare").unwrap();
        std::fs::write(dir.path().join("8.webp"), b"webp").unwrap();

        let resources = ResourceDir::new(dir.path());
        assert_eq!(resources.load(7).await.unwrap(), Bytes::from_static(b"bare"));
        assert_eq!(resources.load(8).await.unwrap(), Bytes::from_static(b"webp"));
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let dir = TempDir::new().unwrap();
        let err = ResourceDir::new(dir.path()).load(1).await.unwrap_err();
        assert!(err.to_string().contains("resource 1"));
    }
}
