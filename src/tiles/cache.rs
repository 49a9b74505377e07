use crate::core::geo::TileCoord;
use crate::prelude::HashMap;
use crate::tiles::decode::TileImage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the cache knows about one tile.
#[derive(Debug, Clone)]
pub enum TileState {
    /// No entry: never requested, or the last attempt failed
    Empty,
    /// A fetch has been claimed and is in flight
    Pending,
    /// Decoded image, owned by the cache
    Ready(Arc<TileImage>),
}

impl TileState {
    pub fn is_empty(&self) -> bool {
        matches!(self, TileState::Empty)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TileState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TileState::Ready(_))
    }

    pub fn image(&self) -> Option<Arc<TileImage>> {
        match self {
            TileState::Ready(image) => Some(Arc::clone(image)),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Entry {
    Pending,
    Ready(Arc<TileImage>),
}

/// Counts of cache entries by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pending: usize,
    pub ready: usize,
}

/// Concurrent store from tile coordinate to tile state.
///
/// Every transition happens under one lock, so `claim` is a true
/// compare-and-set: of any number of callers racing on the same missing
/// tile exactly one gets `true`. Entries are never evicted; a `Ready` tile
/// stays for the lifetime of the cache.
#[derive(Debug, Default)]
pub struct TileCache {
    entries: Mutex<HashMap<TileCoord, Entry>>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TileCoord, Entry>> {
        // Every critical section leaves the map consistent, so a panic
        // elsewhere while holding the lock does not invalidate it
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of `coord`; `Empty` when absent
    pub fn lookup(&self, coord: &TileCoord) -> TileState {
        match self.entries().get(coord) {
            None => TileState::Empty,
            Some(Entry::Pending) => TileState::Pending,
            Some(Entry::Ready(image)) => TileState::Ready(Arc::clone(image)),
        }
    }

    /// Atomically moves `coord` from `Empty` to `Pending`.
    ///
    /// Returns `true` if this caller became the tile's sole fetcher.
    pub fn claim(&self, coord: TileCoord) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(&coord) {
            return false;
        }
        entries.insert(coord, Entry::Pending);
        log::debug!("claimed tile {}", coord);
        true
    }

    /// Moves `coord` from `Pending` to `Ready(image)`.
    ///
    /// Returns `false`, leaving the cache untouched, if the tile was not
    /// pending; a ready image is never replaced.
    pub fn complete(&self, coord: TileCoord, image: Arc<TileImage>) -> bool {
        let mut entries = self.entries();
        match entries.get(&coord) {
            Some(Entry::Pending) => {
                entries.insert(coord, Entry::Ready(image));
                true
            }
            Some(Entry::Ready(_)) => {
                log::warn!("complete({}) on a ready tile, keeping the cached image", coord);
                false
            }
            None => {
                log::warn!("complete({}) on a tile that was never claimed", coord);
                false
            }
        }
    }

    /// Moves `coord` from `Pending` back to `Empty` so a later scan can claim
    /// it again. Returns `false` if the tile was not pending.
    pub fn fail(&self, coord: TileCoord) -> bool {
        let mut entries = self.entries();
        match entries.get(&coord) {
            Some(Entry::Pending) => {
                entries.remove(&coord);
                true
            }
            Some(Entry::Ready(_)) => {
                log::warn!("fail({}) on a ready tile, ignoring", coord);
                false
            }
            None => {
                log::warn!("fail({}) on a tile that was never claimed", coord);
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.entries()
            .values()
            .fold(CacheStats::default(), |mut stats, entry| {
                match entry {
                    Entry::Pending => stats.pending += 1,
                    Entry::Ready(_) => stats.ready += 1,
                }
                stats
            })
    }

    /// Number of tiles that are pending or ready
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
