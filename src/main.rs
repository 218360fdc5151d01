use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::domain::entities::{ImageResult, TargetSize};
use pixcache::infrastructure::config::Command;
use pixcache::infrastructure::{
    AppConfig, CliArgs, DiskImageCache, ImageLoader, ImageRequest, LoaderConfig, RequestStatus,
    StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }

    Ok(())
}

fn report(result: &ImageResult) {
    match (&result.image, result.origin) {
        (Some(image), Some(origin)) => {
            println!("{}: {}x{} ({origin})", result.key, image.width(), image.height());
        }
        _ => println!("{}: failed", result.key),
    }
}

async fn load(config: LoaderConfig, urls: Vec<String>, size: TargetSize) -> Result<()> {
    let (loader, mut queue) = ImageLoader::new(config).await?;

    let mut outstanding = 0usize;
    for url in &urls {
        let status = loader.request(ImageRequest::url(url).size(size).on_result(|r| report(&r)));
        if matches!(status, RequestStatus::Dispatched | RequestStatus::Queued) {
            outstanding += 1;
        }
    }

    while outstanding > 0 {
        match queue.next().await {
            Some(served) => outstanding = outstanding.saturating_sub(served),
            None => break,
        }
    }

    info!(stats = %loader.memory_cache_stats(), "Done");
    Ok(())
}

async fn open_disk(config: &LoaderConfig) -> Result<DiskImageCache> {
    Ok(DiskImageCache::new(config.effective_disk_cache_dir(), config.disk_cache_max_bytes).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(&args);

    init_logging(&config)?;

    info!(version = pixcache::VERSION, "Starting pixcache");

    match args.command {
        Command::Load { urls, width, height } => {
            load(config.loader, urls, TargetSize::new(width, height)).await
        }
        Command::Clear => {
            let disk = open_disk(&config.loader).await?;
            disk.clear().await?;
            println!("Cleared {}", disk.dir().display());
            Ok(())
        }
        Command::Stats => {
            let disk = open_disk(&config.loader).await?;
            println!(
                "{}: {} files, {} KiB",
                disk.dir().display(),
                disk.len(),
                disk.current_size() / 1024
            );
            Ok(())
        }
    }
}
