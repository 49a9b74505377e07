//! Serialises viewport changes into visible-tile scans.
//!
//! Every viewport change bumps a generation counter and queues a scan on a
//! single worker task. A scan compares its generation with the counter
//! before each tile and gives up as soon as a newer viewport exists, so the
//! last scan to complete always belongs to the latest viewport. Fetches a
//! superseded scan already submitted are left to finish.

use crate::core::viewport::Viewport;
use crate::layers::observer::InvalidationChannel;
use crate::tiles::loader::TileLoader;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No scan queued or running
    Idle,
    /// At least one scan is queued or running
    Recomputing,
}

/// How a scan ended and how many fetches it submitted on the way
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { submitted: usize },
    Superseded { submitted: usize },
}

/// Walks the visible tiles of `viewport` and submits a fetch for every cache
/// miss. `is_current` is consulted before each tile; once it returns `false`
/// the scan stops.
pub fn scan_viewport(
    loader: &TileLoader,
    viewport: &Viewport,
    is_current: impl Fn() -> bool,
) -> ScanOutcome {
    let mut submitted = 0;
    for placement in viewport.visible_tiles().iter() {
        if !is_current() {
            return ScanOutcome::Superseded { submitted };
        }
        // Pending and ready tiles need nothing; a racing claim is settled by the cache
        if loader.cache().lookup(&placement.coord).is_empty()
            && loader.submit_fetch(placement.coord).is_some()
        {
            submitted += 1;
        }
    }
    ScanOutcome::Completed { submitted }
}

struct Recompute {
    generation: u64,
    viewport: Viewport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub completed: u64,
    pub superseded: u64,
}

struct Shared {
    loader: Arc<TileLoader>,
    invalidation: Arc<InvalidationChannel>,
    generation: AtomicU64,
    scheduled: AtomicUsize,
    last_completed: Mutex<Option<Viewport>>,
    completed: AtomicU64,
    superseded: AtomicU64,
}

impl Shared {
    fn run(&self, job: Recompute) {
        let is_current = || self.generation.load(Ordering::Acquire) == job.generation;
        if !is_current() {
            log::debug!("skipping stale scan #{}", job.generation);
            self.superseded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match scan_viewport(&self.loader, &job.viewport, is_current) {
            ScanOutcome::Completed { submitted } => {
                log::debug!("scan #{} done, {} new fetches", job.generation, submitted);
                *lock(&self.last_completed) = Some(job.viewport);
                self.completed.fetch_add(1, Ordering::Relaxed);
                // Tiles already cached now sit at new offsets
                self.invalidation.notify();
            }
            ScanOutcome::Superseded { submitted } => {
                log::debug!(
                    "scan #{} superseded after {} new fetches",
                    job.generation,
                    submitted
                );
                self.superseded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ViewportCoordinator {
    shared: Arc<Shared>,
    current: Mutex<Option<Viewport>>,
    job_tx: mpsc::UnboundedSender<Recompute>,
}

impl ViewportCoordinator {
    /// Starts the serial scan worker on `runtime`.
    pub fn spawn(
        runtime: &Handle,
        loader: Arc<TileLoader>,
        invalidation: Arc<InvalidationChannel>,
    ) -> Self {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Recompute>();
        let shared = Arc::new(Shared {
            loader,
            invalidation,
            generation: AtomicU64::new(0),
            scheduled: AtomicUsize::new(0),
            last_completed: Mutex::new(None),
            completed: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        });

        let worker = Arc::clone(&shared);
        runtime.spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let generation = job.generation;
                if catch_unwind(AssertUnwindSafe(|| worker.run(job))).is_err() {
                    log::error!("scan #{} panicked, dropping it", generation);
                }
                worker.scheduled.fetch_sub(1, Ordering::AcqRel);
            }
            log::debug!("viewport coordinator exiting");
        });

        Self {
            shared,
            current: Mutex::new(None),
            job_tx,
        }
    }

    /// Records `viewport` as current and queues a scan for it, superseding
    /// any scan still queued or running. Returns the scan's generation.
    pub fn on_viewport_changed(&self, viewport: Viewport) -> u64 {
        *lock(&self.current) = Some(viewport);

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.scheduled.fetch_add(1, Ordering::AcqRel);
        if self.job_tx.send(Recompute { generation, viewport }).is_err() {
            log::warn!("viewport coordinator is shut down, scan #{} dropped", generation);
            self.shared.scheduled.fetch_sub(1, Ordering::AcqRel);
        }
        generation
    }

    /// The viewport most recently passed to `on_viewport_changed`
    pub fn current_viewport(&self) -> Option<Viewport> {
        *lock(&self.current)
    }

    /// The viewport of the most recent scan that ran to the end
    pub fn last_completed_viewport(&self) -> Option<Viewport> {
        *lock(&self.shared.last_completed)
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CoordinatorState {
        if self.shared.scheduled.load(Ordering::Acquire) == 0 {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Recomputing
        }
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            superseded: self.shared.superseded.load(Ordering::Relaxed),
        }
    }
}
