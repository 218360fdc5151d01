//! Application configuration.

pub mod app_config;
pub mod args;
pub mod loader_config;
pub mod storage;

pub use app_config::{AppConfig, LogLevel};
pub use args::{CliArgs, Command};
pub use loader_config::LoaderConfig;
pub use storage::{ConfigError, StorageManager};
