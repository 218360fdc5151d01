//! Hands finished loads back to the context that owns the display targets.
//!
//! Background tasks never touch targets. They push a [`Completion`] onto a
//! channel; whoever owns the UI pumps the [`DeliveryQueue`] and results are
//! applied there, one waiter at a time, in request order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::entities::{CacheKey, ImageOrigin, ImageResult, SharedImage};
use crate::domain::ports::ProgressIndicator;

use super::consumer::{ConsumerHandle, ConsumerTable};

/// Callback receiving the outcome of a request.
pub type ResultCallback = Box<dyn FnOnce(ImageResult) + Send>;

/// Predicate telling whether the requesting row is still on screen.
pub type VisibilityCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Everything a request wants done once its image is known.
#[derive(Default)]
pub struct PendingRequest {
    pub(crate) consumer: Option<ConsumerHandle>,
    pub(crate) progress: Option<Arc<dyn ProgressIndicator>>,
    pub(crate) visible: Option<VisibilityCheck>,
    pub(crate) on_result: Option<ResultCallback>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("consumer", &self.consumer)
            .field("progress", &self.progress.is_some())
            .field("visible", &self.visible.is_some())
            .field("on_result", &self.on_result.is_some())
            .finish()
    }
}

/// A finished load with the waiters it resolves.
pub(crate) struct Completion {
    pub(crate) key: CacheKey,
    pub(crate) image: Option<SharedImage>,
    pub(crate) origin: Option<ImageOrigin>,
    pub(crate) waiters: Vec<PendingRequest>,
}

/// Applies one result to one waiter.
///
/// The progress indicator is always hidden and the callback always runs.
/// The image reaches the target only if the consumer is still registered,
/// still bound to `key` and still visible.
pub(crate) fn deliver(
    consumers: &ConsumerTable,
    key: &CacheKey,
    image: Option<&SharedImage>,
    origin: Option<ImageOrigin>,
    request: PendingRequest,
) {
    let PendingRequest {
        consumer,
        progress,
        visible,
        on_result,
    } = request;

    if let Some(progress) = progress {
        progress.set_visible(false);
    }

    let mut applied = false;
    if let (Some(image), Some(handle)) = (image, consumer) {
        let on_screen = visible.as_ref().is_none_or(|check| check());
        match consumers.resolve_for(handle, key) {
            Some(target) if on_screen => {
                target.set_image(image.clone());
                applied = true;
            }
            Some(_) => trace!(key = %key, "Consumer scrolled away, skipping"),
            None => trace!(key = %key, "Consumer released or recycled, skipping"),
        }
    }

    if let Some(callback) = on_result {
        callback(ImageResult {
            key: key.clone(),
            image: image.cloned(),
            origin,
            applied,
        });
    }
}

/// Receiving end of the loader's completions.
///
/// Owned by the delivery context. Nothing is applied to a target until this
/// queue is pumped.
pub struct DeliveryQueue {
    rx: mpsc::UnboundedReceiver<Completion>,
    consumers: Arc<ConsumerTable>,
}

impl DeliveryQueue {
    pub(crate) const fn new(
        rx: mpsc::UnboundedReceiver<Completion>,
        consumers: Arc<ConsumerTable>,
    ) -> Self {
        Self { rx, consumers }
    }

    /// Waits for the next finished load and delivers it to all its waiters.
    ///
    /// Returns the number of waiters served, or `None` once the loader and
    /// all of its tasks are gone.
    pub async fn next(&mut self) -> Option<usize> {
        let completion = self.rx.recv().await?;
        Some(self.dispatch(completion))
    }

    /// Delivers every completion that is already available without waiting.
    ///
    /// Returns the number of waiters served.
    pub fn drain(&mut self) -> usize {
        let mut served = 0;
        while let Ok(completion) = self.rx.try_recv() {
            served += self.dispatch(completion);
        }
        served
    }

    fn dispatch(&self, completion: Completion) -> usize {
        let Completion {
            key,
            image,
            origin,
            waiters,
        } = completion;
        let count = waiters.len();
        trace!(key = %key, waiters = count, success = image.is_some(), "Delivering");
        for waiter in waiters {
            deliver(&self.consumers, &key, image.as_ref(), origin, waiter);
        }
        count
    }
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("consumers", &self.consumers)
            .finish_non_exhaustive()
    }
}
