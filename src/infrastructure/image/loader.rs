//! Async image loading coordinator.
//!
//! Requests resolve against the memory cache first and are answered inline
//! on a hit. Misses start one background pipeline per key (disk, then
//! network or bundled resource, then decode); later requests for the same key
//! queue behind it and are served together, in request order, through the
//! [`DeliveryQueue`]. Keys that failed are remembered and answered at once
//! with "no image" until [`ImageLoader::clear_failures`] is called.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    CacheKey, ImageOrigin, ImageResult, ImageSource, SharedImage, TargetSize,
};
use crate::domain::errors::{CacheError, CacheResult, DecodeError, FetchError, LoaderError};
use crate::domain::ports::{
    FetchPort, FetchedBody, ImageCachePort, ImageCodec, ProgressIndicator, ResourcePort,
};
use crate::infrastructure::config::LoaderConfig;

use super::codec::RasterCodec;
use super::consumer::{ConsumerHandle, ConsumerTable};
use super::decoder::{DecodeInput, Decoder};
use super::delivery::{Completion, DeliveryQueue, PendingRequest, deliver};
use super::disk_cache::DiskImageCache;
use super::fetcher::HttpFetcher;
use super::memory_cache::{CacheStats, MemoryImageCache};
use super::resources::ResourceDir;

/// A request for one image on behalf of one consumer.
#[derive(Debug)]
pub struct ImageRequest {
    key: CacheKey,
    source: ImageSource,
    size: TargetSize,
    pending: PendingRequest,
}

impl ImageRequest {
    /// Creates a request for `source`, cached under `key`.
    pub fn new(key: impl Into<CacheKey>, source: ImageSource) -> Self {
        Self {
            key: key.into(),
            source,
            size: TargetSize::ORIGINAL,
            pending: PendingRequest::default(),
        }
    }

    /// Creates a request for a remote image keyed by its URL.
    #[must_use]
    pub fn url(url: &str) -> Self {
        Self::new(url, ImageSource::RemoteUrl(url.to_string()))
    }

    /// Sets the size the image will be displayed at.
    #[must_use]
    pub const fn size(mut self, size: TargetSize) -> Self {
        self.size = size;
        self
    }

    /// Sets the display target that should receive the image.
    #[must_use]
    pub const fn consumer(mut self, handle: ConsumerHandle) -> Self {
        self.pending.consumer = Some(handle);
        self
    }

    /// Attaches a progress indicator, shown while the load is outstanding.
    #[must_use]
    pub fn progress(mut self, indicator: Arc<dyn ProgressIndicator>) -> Self {
        self.pending.progress = Some(indicator);
        self
    }

    /// Sets the predicate consulted at delivery time; the image is only
    /// applied while it returns true.
    #[must_use]
    pub fn visible_when(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.pending.visible = Some(Arc::new(check));
        self
    }

    /// Sets a callback receiving the outcome.
    #[must_use]
    pub fn on_result(mut self, callback: impl FnOnce(ImageResult) + Send + 'static) -> Self {
        self.pending.on_result = Some(Box::new(callback));
        self
    }
}

/// How a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Served from memory before returning.
    Delivered,
    /// Answered with "no image" because the key failed before.
    Failed,
    /// Joined a load already in flight.
    Queued,
    /// Started a new background load.
    Dispatched,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Resource(#[from] CacheError),
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Default)]
struct LoadState {
    in_flight: HashMap<CacheKey, Vec<PendingRequest>>,
    failures: HashSet<CacheKey>,
}

struct Shared {
    memory: Arc<MemoryImageCache>,
    disk: Option<Arc<DiskImageCache>>,
    fetcher: Arc<dyn FetchPort>,
    resources: Arc<dyn ResourcePort>,
    decoder: Decoder,
    consumers: Arc<ConsumerTable>,
    state: Mutex<LoadState>,
    permits: Semaphore,
    delivery_tx: mpsc::UnboundedSender<Completion>,
    runtime: Handle,
}

/// Builds an [`ImageLoader`] from configuration, with overridable parts.
pub struct ImageLoaderBuilder {
    config: LoaderConfig,
    fetcher: Option<Arc<dyn FetchPort>>,
    codec: Option<Arc<dyn ImageCodec>>,
    resources: Option<Arc<dyn ResourcePort>>,
    disk: Option<Option<Arc<DiskImageCache>>>,
}

impl ImageLoaderBuilder {
    /// Replaces the HTTP fetcher.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn FetchPort>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replaces the image codec.
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Replaces the bundled resource source.
    #[must_use]
    pub fn resources(mut self, resources: Arc<dyn ResourcePort>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Uses an already opened disk cache.
    #[must_use]
    pub fn disk_cache(mut self, disk: Arc<DiskImageCache>) -> Self {
        self.disk = Some(Some(disk));
        self
    }

    /// Runs without a disk cache.
    #[must_use]
    pub fn without_disk_cache(mut self) -> Self {
        self.disk = Some(None);
        self
    }

    /// Builds the loader and the queue its results are delivered through.
    ///
    /// A disk cache that cannot be opened is logged and skipped.
    ///
    /// # Errors
    /// Returns [`LoaderError`] outside a tokio runtime, for an invalid
    /// configuration, or if the HTTP client cannot be created.
    pub async fn build(self) -> Result<(ImageLoader, DeliveryQueue), LoaderError> {
        let runtime = Handle::try_current().map_err(|e| LoaderError::NoRuntime {
            message: e.to_string(),
        })?;
        let config = self.config;
        if config.max_concurrent_tasks == 0 {
            return Err(LoaderError::Config {
                message: "max_concurrent_tasks must be at least 1".to_string(),
            });
        }

        let fetcher: Arc<dyn FetchPort> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpFetcher::new(
                    config.connect_timeout(),
                    config.read_timeout(),
                    config.max_redirects,
                )?
                .with_stream_mark_limit(config.stream_mark_limit)
                .with_max_body_bytes(config.max_body_bytes),
            ),
        };
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(RasterCodec::new(config.max_decoded_bytes)));
        let resources = self
            .resources
            .unwrap_or_else(|| Arc::new(ResourceDir::new(config.resource_dir.clone())));

        let disk = match self.disk {
            Some(disk) => disk,
            None if config.disk_cache_enabled => open_disk_cache(&config).await,
            None => None,
        };

        let consumers = Arc::new(ConsumerTable::new());
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        let shared = Shared {
            memory: Arc::new(MemoryImageCache::new(config.memory_cache_bytes)),
            disk,
            fetcher,
            resources,
            decoder: Decoder::new(codec).with_max_attempts(config.max_decode_attempts),
            consumers: consumers.clone(),
            state: Mutex::new(LoadState::default()),
            permits: Semaphore::new(config.max_concurrent_tasks),
            delivery_tx,
            runtime,
        };

        info!(
            memory_bytes = config.memory_cache_bytes,
            disk = shared.disk.is_some(),
            concurrency = config.max_concurrent_tasks,
            "Image loader ready"
        );

        Ok((
            ImageLoader {
                shared: Arc::new(shared),
            },
            DeliveryQueue::new(delivery_rx, consumers),
        ))
    }
}

async fn open_disk_cache(config: &LoaderConfig) -> Option<Arc<DiskImageCache>> {
    let dir = config.effective_disk_cache_dir();
    match DiskImageCache::new(dir.clone(), config.disk_cache_max_bytes).await {
        Ok(cache) => Some(Arc::new(cache)),
        Err(e) => {
            warn!(
                dir = %dir.display(),
                error = %e,
                "Disk cache unavailable, continuing without it"
            );
            None
        }
    }
}

/// Orchestrates image loading from memory, disk, network and resources.
#[derive(Clone)]
pub struct ImageLoader {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("memory", &self.shared.memory)
            .field("disk", &self.shared.disk)
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Starts building a loader.
    #[must_use]
    pub fn builder(config: LoaderConfig) -> ImageLoaderBuilder {
        ImageLoaderBuilder {
            config,
            fetcher: None,
            codec: None,
            resources: None,
            disk: None,
        }
    }

    /// Builds a loader from `config` with the default parts.
    ///
    /// # Errors
    /// See [`ImageLoaderBuilder::build`].
    pub async fn new(config: LoaderConfig) -> Result<(Self, DeliveryQueue), LoaderError> {
        Self::builder(config).build().await
    }

    /// Requests an image.
    ///
    /// A memory hit is delivered before this returns, as is a key that
    /// failed before. Otherwise the request joins the load in flight for its
    /// key or starts one, and is served when the [`DeliveryQueue`] is pumped.
    pub fn request(&self, request: ImageRequest) -> RequestStatus {
        let ImageRequest {
            key,
            source,
            size,
            pending,
        } = request;
        let shared = &self.shared;

        if let Some(handle) = pending.consumer {
            shared.consumers.bind(handle, key.clone());
        }

        let mut state = shared.state.lock();
        if let Some(image) = shared.memory.get(&key) {
            drop(state);
            deliver(
                &shared.consumers,
                &key,
                Some(&image),
                Some(ImageOrigin::Memory),
                pending,
            );
            return RequestStatus::Delivered;
        }
        if state.failures.contains(&key) {
            drop(state);
            trace!(key = %key, "Key failed before, answering immediately");
            deliver(&shared.consumers, &key, None, None, pending);
            return RequestStatus::Failed;
        }

        let progress = pending.progress.clone();
        let status = if let Some(waiters) = state.in_flight.get_mut(&key) {
            waiters.push(pending);
            trace!(key = %key, waiters = waiters.len(), "Joined load in flight");
            RequestStatus::Queued
        } else {
            state.in_flight.insert(key.clone(), vec![pending]);
            RequestStatus::Dispatched
        };
        drop(state);

        if let Some(progress) = progress {
            progress.set_visible(true);
        }
        if status == RequestStatus::Dispatched {
            debug!(key = %key, source = ?source, "Dispatching image load");
            self.spawn(key, source, size);
        }
        status
    }

    /// Warms the caches for `key` without a consumer.
    pub fn prefetch(
        &self,
        key: impl Into<CacheKey>,
        source: ImageSource,
        size: TargetSize,
    ) -> RequestStatus {
        self.request(ImageRequest::new(key, source).size(size))
    }

    fn spawn(&self, key: CacheKey, source: ImageSource, size: TargetSize) {
        let shared = self.shared.clone();
        self.shared.runtime.spawn(async move {
            let outcome = match shared.permits.acquire().await {
                Ok(_permit) => {
                    // a panicking port must still resolve the key
                    let worker = shared.clone();
                    let worker_key = key.clone();
                    let pipeline =
                        async move { worker.run_pipeline(&worker_key, source, size).await };
                    shared
                        .runtime
                        .spawn(pipeline)
                        .await
                        .unwrap_or_else(|e| Err(PipelineError::Task(e.to_string())))
                }
                Err(e) => Err(PipelineError::Task(e.to_string())),
            };
            let (image, origin) = match outcome {
                Ok((image, origin)) => {
                    debug!(
                        key = %key,
                        %origin,
                        width = image.width(),
                        height = image.height(),
                        "Image loaded"
                    );
                    (Some(image), Some(origin))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Image load failed");
                    (None, None)
                }
            };
            shared.complete(key, image, origin);
        });
    }

    /// Forgets every failed key so it can be retried.
    pub fn clear_failures(&self) {
        let mut state = self.shared.state.lock();
        let count = state.failures.len();
        state.failures.clear();
        debug!(count, "Cleared failed keys");
    }

    /// Empties the memory and disk caches. Failed keys are kept.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be read.
    pub async fn clear_all_caches(&self) -> CacheResult<()> {
        self.shared.memory.clear();
        if let Some(disk) = &self.shared.disk {
            disk.clear().await?;
        }
        info!("Cleared all image caches");
        Ok(())
    }

    /// Returns true if a load for `key` is running or queued.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.shared.state.lock().in_flight.contains_key(key)
    }

    /// Returns the number of keys with a load in flight.
    pub fn in_flight_count(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Returns true if `key` is remembered as failed.
    pub fn is_failed(&self, key: &CacheKey) -> bool {
        self.shared.state.lock().failures.contains(key)
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.shared.memory.stats()
    }

    /// Returns the memory cache.
    #[must_use]
    pub fn memory_cache(&self) -> &MemoryImageCache {
        &self.shared.memory
    }

    /// Returns the disk cache, if one is in use.
    #[must_use]
    pub fn disk_cache(&self) -> Option<&Arc<DiskImageCache>> {
        self.shared.disk.as_ref()
    }

    /// Returns the table display targets are registered in.
    #[must_use]
    pub fn consumers(&self) -> &Arc<ConsumerTable> {
        &self.shared.consumers
    }
}

impl Shared {
    async fn run_pipeline(
        &self,
        key: &CacheKey,
        source: ImageSource,
        size: TargetSize,
    ) -> Result<(SharedImage, ImageOrigin), PipelineError> {
        match source {
            ImageSource::Raw(image) => Ok((image, ImageOrigin::Raw)),
            ImageSource::LocalResource(id) => {
                let bytes = self.resources.load(id).await?;
                let image = self.decode(DecodeInput::Bytes(bytes), size).await?;
                Ok((image, ImageOrigin::Resource))
            }
            ImageSource::RemoteUrl(url) => self.load_remote(key, &url, size).await,
        }
    }

    async fn load_remote(
        &self,
        key: &CacheKey,
        url: &str,
        size: TargetSize,
    ) -> Result<(SharedImage, ImageOrigin), PipelineError> {
        let blob: Option<PathBuf> = self.disk.as_ref().map(|disk| disk.path_for(key));

        if let Some(disk) = &self.disk
            && let Some(path) = &blob
            && disk.exists(key).await
        {
            trace!(key = %key, "Decoding from disk cache");
            let image = self.decode(DecodeInput::File(path.clone()), size).await?;
            return Ok((image, ImageOrigin::Disk));
        }

        match self.fetcher.fetch(url, blob.as_deref()).await? {
            FetchedBody::Persisted(path) => {
                if let Some(disk) = &self.disk {
                    disk.record_stored(key).await;
                }
                match self.decode(DecodeInput::File(path), size).await {
                    Ok(image) => Ok((image, ImageOrigin::Network)),
                    Err(e) => {
                        // an undecodable fresh blob is dropped so a retry fetches again
                        if let Some(disk) = &self.disk {
                            disk.evict(key).await;
                        }
                        Err(e)
                    }
                }
            }
            FetchedBody::Stream(stream) => {
                let image = self.decode(DecodeInput::Stream(stream), size).await?;
                Ok((image, ImageOrigin::Network))
            }
        }
    }

    async fn decode(
        &self,
        input: DecodeInput,
        size: TargetSize,
    ) -> Result<SharedImage, PipelineError> {
        let decoder = self.decoder.clone();
        tokio::task::spawn_blocking(move || decoder.decode(input, size))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
            .map_err(PipelineError::from)
    }

    /// Publishes a finished load. The memory cache is filled before the
    /// in-flight entry is removed, so no request can miss both.
    fn complete(&self, key: CacheKey, image: Option<SharedImage>, origin: Option<ImageOrigin>) {
        if let Some(image) = &image {
            self.memory.put(key.clone(), image.clone());
        }

        let waiters = {
            let mut state = self.state.lock();
            if image.is_none() {
                state.failures.insert(key.clone());
            }
            state.in_flight.remove(&key).unwrap_or_default()
        };

        let completion = Completion {
            key,
            image,
            origin,
            waiters,
        };
        if self.delivery_tx.send(completion).is_err() {
            debug!("Delivery queue dropped, discarding result");
        }
    }
}
