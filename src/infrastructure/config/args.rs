use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "pixcache",
    version,
    about = "Load, decode and cache images through a memory and disk pipeline",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "DIR", env = "PIXCACHE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum concurrent background loads.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Decode network streams without persisting them.
    #[arg(long, global = true)]
    pub no_disk_cache: bool,

    /// Action to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load images through the pipeline and report their decoded size.
    Load {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Requested width in pixels.
        #[arg(long, default_value_t = 0)]
        width: u32,

        /// Requested height in pixels.
        #[arg(long, default_value_t = 0)]
        height: u32,
    },
    /// Remove every cached blob from the disk cache.
    Clear,
    /// Show disk cache usage.
    Stats,
}
