//! Image loader configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::ConfigError;
use crate::infrastructure::image::disk_cache::{DEFAULT_MAX_CACHE_SIZE, default_cache_dir};

const MIB: u64 = 1024 * 1024;

/// Tuning knobs for the image pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Byte budget of the decoded-image memory cache.
    pub memory_cache_bytes: u64,

    /// Persist fetched bytes to the disk cache.
    pub disk_cache_enabled: bool,

    /// Disk cache directory; platform cache dir when unset.
    pub disk_cache_dir: Option<PathBuf>,

    /// Disk cache size limit in bytes.
    pub disk_cache_max_bytes: u64,

    /// Directory holding bundled images addressed by resource id.
    pub resource_dir: PathBuf,

    /// Maximum background pipelines running at once.
    pub max_concurrent_tasks: usize,

    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds.
    pub read_timeout_ms: u64,

    /// Maximum redirects followed per fetch.
    pub max_redirects: usize,

    /// Decode attempts before an out-of-memory decode is abandoned.
    pub max_decode_attempts: u32,

    /// Largest decoded buffer a single decode may produce.
    pub max_decoded_bytes: u64,

    /// Bytes of an uncached network stream kept for rewinding.
    pub stream_mark_limit: usize,

    /// Largest response body accepted from the network.
    pub max_body_bytes: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            memory_cache_bytes: 64 * MIB,
            disk_cache_enabled: true,
            disk_cache_dir: None,
            disk_cache_max_bytes: DEFAULT_MAX_CACHE_SIZE,
            resource_dir: PathBuf::from("assets"),
            max_concurrent_tasks: 4,
            connect_timeout_ms: 1000,
            read_timeout_ms: 5000,
            max_redirects: 10,
            max_decode_attempts: 4,
            max_decoded_bytes: 48 * MIB,
            stream_mark_limit: 1024 * 1024,
            max_body_bytes: 32 * MIB,
        }
    }
}

impl LoaderConfig {
    /// Reads a standalone loader configuration. A missing file yields the
    /// defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No loader config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Returns the effective disk cache directory.
    #[must_use]
    pub fn effective_disk_cache_dir(&self) -> PathBuf {
        self.disk_cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_list_view_timeouts() {
        let config = LoaderConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert!(config.max_decode_attempts > 0);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LoaderConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_load_rejects_bad_types() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("loader.toml");
        std::fs::write(&path, "max_redirects = \"many\"").unwrap();
        assert!(matches!(
            LoaderConfig::load(&path),
            Err(ConfigError::TomlDe(_))
        ));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LoaderConfig = toml::from_str(
            r#"
            max_concurrent_tasks = 8
            disk_cache_enabled = false
            disk_cache_dir = "/tmp/pixcache-test"
            max_body_bytes = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_tasks, 8);
        assert!(!config.disk_cache_enabled);
        assert_eq!(
            config.effective_disk_cache_dir(),
            PathBuf::from("/tmp/pixcache-test")
        );
        assert_eq!(config.max_body_bytes, 4096);
        assert_eq!(config.read_timeout_ms, 5000);
    }
}
