use crate::core::geo::TileCoord;
use crate::layers::observer::InvalidationChannel;
use crate::tiles::cache::TileCache;
use crate::tiles::decode::{TileDecoder, TileImage};
use crate::tiles::source::TileSource;
use crate::tiles::transport::TileTransport;
use crate::{MapError, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

/// Lifecycle of one submitted fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Queued,
    Running,
    Finished,
    Cancelled,
}

/// Handle to a fetch that won its claim and was queued.
///
/// Only a queued fetch can be cancelled; once a worker picks it up it runs
/// to completion or failure.
#[derive(Debug, Clone)]
pub struct FetchHandle {
    coord: TileCoord,
    state: Arc<AtomicU8>,
    cache: Arc<TileCache>,
}

impl FetchHandle {
    fn new(coord: TileCoord, cache: Arc<TileCache>) -> Self {
        Self {
            coord,
            state: Arc::new(AtomicU8::new(QUEUED)),
            cache,
        }
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn status(&self) -> FetchStatus {
        match self.state.load(Ordering::Acquire) {
            QUEUED => FetchStatus::Queued,
            RUNNING => FetchStatus::Running,
            FINISHED => FetchStatus::Finished,
            _ => FetchStatus::Cancelled,
        }
    }

    /// Cancels the fetch if no worker has started it yet and hands the tile
    /// back to the cache as `Empty`. Returns whether the fetch was stopped.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.cache.fail(self.coord);
            log::debug!("cancelled queued fetch for tile {}", self.coord);
        }
        cancelled
    }

    fn start(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(FINISHED, Ordering::Release);
    }
}

/// Collaborators a fetch worker needs
pub struct FetchContext {
    pub cache: Arc<TileCache>,
    pub source: Arc<dyn TileSource>,
    pub transport: Arc<dyn TileTransport>,
    pub decoder: Arc<dyn TileDecoder>,
    pub invalidation: Arc<InvalidationChannel>,
}

struct Worker {
    context: FetchContext,
    outstanding: AtomicUsize,
}

impl Worker {
    async fn run(&self, handle: FetchHandle) {
        let coord = handle.coord();
        let outcome = AssertUnwindSafe(self.fetch_and_decode(coord))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(MapError::Runtime(format!("fetch of {} panicked", coord))));

        match outcome {
            Ok(image) => {
                let (width, height) = image.dimensions();
                if self.context.cache.complete(coord, Arc::new(image)) {
                    log::info!("downloaded tile {} ({}x{})", coord, width, height);
                    self.context.invalidation.notify();
                }
            }
            Err(e) => {
                log::warn!("tile {} download failed: {}", coord, e);
                self.context.cache.fail(coord);
            }
        }

        handle.finish();
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    async fn fetch_and_decode(&self, coord: TileCoord) -> Result<TileImage> {
        let url = self.context.source.url(coord);
        log::debug!("fetching tile {} from {}", coord, url);
        let bytes = self.context.transport.fetch(&url).await?;
        let decoder = Arc::clone(&self.context.decoder);
        tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| MapError::Runtime(format!("decode task failed: {}", e)))?
    }
}

/// Bounded pool of tile fetches.
///
/// Submissions are claimed in the cache first, then queued FIFO; at most
/// `max_concurrent` fetches execute at any time. A finished fetch writes the
/// cache and, on success only, signals the invalidation channel.
pub struct TileLoader {
    worker: Arc<Worker>,
    job_tx: mpsc::UnboundedSender<FetchHandle>,
    queued: Mutex<Vec<FetchHandle>>,
    max_concurrent: usize,
}

impl TileLoader {
    /// Starts the loader's dispatcher on `runtime`.
    pub fn spawn(runtime: &Handle, max_concurrent: usize, context: FetchContext) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let worker = Arc::new(Worker {
            context,
            outstanding: AtomicUsize::new(0),
        });

        runtime.spawn(Self::dispatch(
            job_rx,
            Arc::new(Semaphore::new(max_concurrent)),
            Arc::clone(&worker),
        ));
        log::debug!("tile loader started with {} workers", max_concurrent);

        Self {
            worker,
            job_tx,
            queued: Mutex::new(Vec::new()),
            max_concurrent,
        }
    }

    async fn dispatch(
        mut job_rx: mpsc::UnboundedReceiver<FetchHandle>,
        semaphore: Arc<Semaphore>,
        worker: Arc<Worker>,
    ) {
        while let Some(handle) = job_rx.recv().await {
            if handle.status() == FetchStatus::Cancelled {
                worker.outstanding.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if !handle.start() {
                // Cancelled while waiting for a permit; the claim was already released
                worker.outstanding.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
                worker.run(handle).await;
                drop(permit);
            });
        }
        log::debug!("tile loader exiting - all submitters gone");
    }

    /// Requests `coord`. Returns `None` without doing anything when another
    /// fetch already owns the tile or it is cached.
    pub fn submit_fetch(&self, coord: TileCoord) -> Option<FetchHandle> {
        let cache = &self.worker.context.cache;
        if !cache.claim(coord) {
            return None;
        }

        let handle = FetchHandle::new(coord, Arc::clone(cache));
        self.worker.outstanding.fetch_add(1, Ordering::AcqRel);
        if self.job_tx.send(handle.clone()).is_err() {
            log::warn!("tile loader is shut down, dropping fetch for {}", coord);
            self.worker.outstanding.fetch_sub(1, Ordering::AcqRel);
            cache.fail(coord);
            return None;
        }

        let mut queued = self.queued.lock().unwrap_or_else(PoisonError::into_inner);
        queued.retain(|h| h.status() == FetchStatus::Queued);
        queued.push(handle.clone());
        Some(handle)
    }

    /// Cancels every fetch that has not started yet; returns how many were stopped
    pub fn cancel_queued(&self) -> usize {
        let handles: Vec<FetchHandle> = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        handles.iter().filter(|h| h.cancel()).count()
    }

    /// Fetches submitted and not yet finished, queued or running
    pub fn outstanding(&self) -> usize {
        self.worker.outstanding.load(Ordering::Acquire)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.worker.context.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_releases_claim_once() {
        let cache = Arc::new(TileCache::new());
        let coord = TileCoord::new(3, 4, 5);
        assert!(cache.claim(coord));

        let handle = FetchHandle::new(coord, Arc::clone(&cache));
        assert_eq!(handle.status(), FetchStatus::Queued);
        assert!(handle.cancel());
        assert_eq!(handle.status(), FetchStatus::Cancelled);
        assert!(cache.lookup(&coord).is_empty());

        assert!(!handle.cancel());
        assert!(!handle.start());
    }

    #[test]
    fn test_started_fetch_cannot_be_cancelled() {
        let cache = Arc::new(TileCache::new());
        let coord = TileCoord::new(0, 0, 0);
        cache.claim(coord);

        let handle = FetchHandle::new(coord, Arc::clone(&cache));
        assert!(handle.start());
        assert!(!handle.cancel());
        assert_eq!(handle.status(), FetchStatus::Running);
        assert!(cache.lookup(&coord).is_pending());

        handle.finish();
        assert_eq!(handle.status(), FetchStatus::Finished);
    }
}
