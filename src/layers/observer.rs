//! Invalidation channel: the "new pixels are ready, redraw" signal.
//!
//! The signal is level-triggered. Any number of `notify` calls made before
//! the consumer acknowledges collapse into one observer callback; a `notify`
//! after the acknowledgement fires again. So at least one redraw always
//! follows the last notification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives invalidations.
///
/// Called from worker threads. Implementations must only hand the signal to
/// the consumer's own thread (post to an event loop, send on a channel) and
/// return promptly.
pub trait LayerObserver: Send + Sync {
    fn invalidate(&self);
}

impl<F> LayerObserver for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self()
    }
}

/// Identifies a registration so a stale observer cannot unregister its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Slot = Option<(ObserverId, Arc<dyn LayerObserver>)>;

#[derive(Default)]
pub struct InvalidationChannel {
    pending: AtomicBool,
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for InvalidationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationChannel")
            .field("pending", &self.is_pending())
            .field("observer", &self.observer().map(|(id, _)| id))
            .finish()
    }
}

impl InvalidationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer(&self) -> Slot {
        self.slot().clone()
    }

    /// Installs `observer`, replacing any previous one. If a notification is
    /// already waiting, the new observer is invalidated right away.
    pub fn register(&self, observer: Arc<dyn LayerObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *self.slot() = Some((id, Arc::clone(&observer)));
        if self.is_pending() {
            observer.invalidate();
        }
        id
    }

    /// Removes the observer if `id` is still the active registration
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some((active, _)) if *active == id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Signals that cached state changed. Never blocks on the consumer.
    pub fn notify(&self) {
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        // Invoke outside the slot lock so an observer may re-register
        if let Some((_, observer)) = self.observer() {
            observer.invalidate();
        }
    }

    /// Called by the consumer when it starts a redraw. Returns whether a
    /// notification was waiting; later `notify` calls fire again.
    pub fn acknowledge(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
