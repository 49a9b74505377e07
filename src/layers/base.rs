use crate::core::viewport::{PlacedTile, Viewport};
use crate::layers::observer::{LayerObserver, ObserverId};
use std::sync::Arc;

/// A map layer as seen by the window that hosts it.
///
/// The host calls these from its own (UI) thread. Observers registered here
/// are invoked from worker threads and must forward the signal to the host's
/// thread rather than touch host state directly.
pub trait MapLayer: Send + Sync {
    /// Layer identifier
    fn id(&self) -> &str;

    /// Human readable layer name
    fn name(&self) -> &str;

    /// Installs the layer's single observer, replacing any previous one
    fn register_observer(&self, observer: Arc<dyn LayerObserver>) -> ObserverId;

    fn unregister_observer(&self, id: ObserverId) -> bool;

    /// Tells the layer what the window now shows. Returns `false` when the
    /// viewport is unchanged and nothing was recomputed.
    fn update_bounds(&self, viewport: Viewport) -> bool;

    /// Tiles to draw into a `width` x `height` window, read from the cache only
    fn placed_tiles(&self, width: u32, height: u32) -> Vec<PlacedTile>;
}
