//! # tilelook
//!
//! Asynchronous tile acquisition and caching for slippy-map viewers.
//!
//! The crate owns the part of a map viewer that decides which tiles are
//! visible, fetches the missing ones under bounded concurrency, keeps them
//! in an in-memory cache and tells the consumer when something new can be
//! drawn. Windowing, compositing and event delivery stay with the consumer.

pub mod core;
pub mod layers;
pub mod prelude;
pub mod tiles;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    builder::TileLayerBuilder,
    config::TileLoadingConfig,
    geo::{BoundingBox, LatLng, Point, TileCoord},
    viewport::{PlacedTile, Viewport, VisibleTileSet},
};

pub use layers::{
    base::MapLayer,
    coordinator::{CoordinatorState, ViewportCoordinator},
    observer::{InvalidationChannel, LayerObserver, ObserverId},
    tile::TileLayer,
};

pub use tiles::{
    cache::{TileCache, TileState},
    decode::{ImageDecoder, TileDecoder, TileImage},
    loader::{FetchHandle, TileLoader},
    source::{OpenStreetMapSource, TemplateSource, TileSource},
    transport::{ReqwestTransport, TileTransport},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Install an `env_logger` backend for the `log` facade.
///
/// Honours `RUST_LOG`; falls back to `info`. Calling it twice is harmless.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
