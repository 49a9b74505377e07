//! Prelude module for common tilelook types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilelook::prelude::*;`

pub use crate::core::{
    builder::TileLayerBuilder,
    config::TileLoadingConfig,
    geo::{BoundingBox, LatLng, Point, TileCoord},
    viewport::{PlacedTile, Viewport, VisibleTileSet},
};

pub use crate::layers::{
    base::MapLayer,
    coordinator::{CoordinatorState, ViewportCoordinator},
    observer::{InvalidationChannel, LayerObserver, ObserverId},
    tile::TileLayer,
};

pub use crate::tiles::{
    cache::{TileCache, TileState},
    decode::{TileDecoder, TileImage},
    loader::{FetchHandle, FetchStatus, TileLoader},
    source::{OpenStreetMapSource, TemplateSource, TileSource},
    transport::TileTransport,
};

pub use crate::{MapError, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
