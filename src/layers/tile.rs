//! Tile layer: the consumer-facing side of the tile pipeline.
//!
//! A `TileLayer` owns one cache, one fetch pool and one scan worker. Two
//! layers never share any of them.

use crate::core::builder::TileLayerBuilder;
use crate::core::config::TileLoadingConfig;
use crate::core::viewport::{PlacedTile, Viewport};
use crate::layers::base::MapLayer;
use crate::layers::coordinator::{CoordinatorState, ViewportCoordinator};
use crate::layers::observer::{InvalidationChannel, LayerObserver, ObserverId};
use crate::tiles::cache::TileCache;
use crate::tiles::loader::TileLoader;
use std::sync::Arc;

pub struct TileLayer {
    id: String,
    name: String,
    config: TileLoadingConfig,
    cache: Arc<TileCache>,
    loader: Arc<TileLoader>,
    coordinator: ViewportCoordinator,
    invalidation: Arc<InvalidationChannel>,
}

impl TileLayer {
    pub fn builder() -> TileLayerBuilder {
        TileLayerBuilder::new()
    }

    pub(crate) fn from_parts(
        id: String,
        name: String,
        config: TileLoadingConfig,
        cache: Arc<TileCache>,
        loader: Arc<TileLoader>,
        coordinator: ViewportCoordinator,
        invalidation: Arc<InvalidationChannel>,
    ) -> Self {
        Self {
            id,
            name,
            config,
            cache,
            loader,
            coordinator,
            invalidation,
        }
    }

    /// Makes `viewport` current and schedules a scan for it. The new
    /// viewport is visible to `current_tiles_and_offsets` immediately.
    pub fn on_viewport_changed(&self, viewport: Viewport) {
        if self.config.cancel_queued_fetches_on_viewport_change {
            let cancelled = self.loader.cancel_queued();
            if cancelled > 0 {
                log::debug!("viewport changed, cancelled {} queued fetches", cancelled);
            }
        }
        self.coordinator.on_viewport_changed(viewport);
    }

    /// Like [`on_viewport_changed`](Self::on_viewport_changed) but does
    /// nothing when `viewport` equals the current one. Returns whether a scan
    /// was scheduled.
    pub fn update_viewport(&self, viewport: Viewport, force: bool) -> bool {
        if !force && self.coordinator.current_viewport() == Some(viewport) {
            return false;
        }
        self.on_viewport_changed(viewport);
        true
    }

    pub fn register_observer(&self, observer: Arc<dyn LayerObserver>) -> ObserverId {
        self.invalidation.register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.invalidation.unregister(id)
    }

    /// Marks the pending invalidation as handled; call at the start of a redraw
    pub fn acknowledge_invalidation(&self) -> bool {
        self.invalidation.acknowledge()
    }

    /// Visible tiles of the current viewport laid out in a `width` x `height`
    /// window, each with its cached image if there is one. Never fetches.
    pub fn current_tiles_and_offsets(&self, width: u32, height: u32) -> Vec<PlacedTile> {
        let Some(viewport) = self.coordinator.current_viewport() else {
            return Vec::new();
        };
        viewport
            .layout(width, height)
            .iter()
            .map(|placement| PlacedTile {
                coord: placement.coord,
                offset: placement.offset,
                image: self.cache.lookup(&placement.coord).image(),
            })
            .collect()
    }

    pub fn current_viewport(&self) -> Option<Viewport> {
        self.coordinator.current_viewport()
    }

    /// No scan pending and no fetch queued or running
    pub fn is_idle(&self) -> bool {
        self.coordinator.state() == CoordinatorState::Idle && self.loader.outstanding() == 0
    }

    pub fn config(&self) -> &TileLoadingConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn loader(&self) -> &Arc<TileLoader> {
        &self.loader
    }

    pub fn coordinator(&self) -> &ViewportCoordinator {
        &self.coordinator
    }
}

impl MapLayer for TileLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn register_observer(&self, observer: Arc<dyn LayerObserver>) -> ObserverId {
        TileLayer::register_observer(self, observer)
    }

    fn unregister_observer(&self, id: ObserverId) -> bool {
        TileLayer::unregister_observer(self, id)
    }

    fn update_bounds(&self, viewport: Viewport) -> bool {
        self.update_viewport(viewport, false)
    }

    fn placed_tiles(&self, width: u32, height: u32) -> Vec<PlacedTile> {
        self.current_tiles_and_offsets(width, height)
    }
}
