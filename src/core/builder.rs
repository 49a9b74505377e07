//! Builder pattern for assembling a tile layer
//!
//! Every collaborator has a production default; tests and embedders swap in
//! their own transport, decoder, tile source or runtime.

use crate::core::config::TileLoadingConfig;
use crate::layers::coordinator::ViewportCoordinator;
use crate::layers::observer::InvalidationChannel;
use crate::layers::tile::TileLayer;
use crate::tiles::cache::TileCache;
use crate::tiles::decode::{ImageDecoder, TileDecoder};
use crate::tiles::loader::{FetchContext, TileLoader};
use crate::tiles::source::{TemplateSource, TileSource};
use crate::tiles::transport::{ReqwestTransport, TileTransport};
use crate::{MapError, Result};
use std::sync::Arc;
use tokio::runtime::Handle;

pub struct TileLayerBuilder {
    id: String,
    name: String,
    config: TileLoadingConfig,
    runtime: Option<Handle>,
    source: Option<Arc<dyn TileSource>>,
    transport: Option<Arc<dyn TileTransport>>,
    decoder: Option<Arc<dyn TileDecoder>>,
}

impl TileLayerBuilder {
    pub fn new() -> Self {
        Self {
            id: "osm".to_string(),
            name: "OpenStreetMap".to_string(),
            config: TileLoadingConfig::default(),
            runtime: None,
            source: None,
            transport: None,
            decoder: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: TileLoadingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrent_fetches(mut self, max: usize) -> Self {
        self.config.max_concurrent_fetches = max;
        self
    }

    /// Runtime that hosts the fetch pool and the scan worker. Defaults to
    /// the runtime `build` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn source(mut self, source: Arc<dyn TileSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn TileTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn TileDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> Result<TileLayer> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| {
                MapError::Runtime(format!("no tokio runtime to host the tile layer: {}", e))
            })?,
        };
        let transport: Arc<dyn TileTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(TemplateSource::from_config(&self.config)));
        let decoder = self.decoder.unwrap_or_else(|| Arc::new(ImageDecoder));

        let cache = Arc::new(TileCache::new());
        let invalidation = Arc::new(InvalidationChannel::new());
        let loader = Arc::new(TileLoader::spawn(
            &runtime,
            self.config.max_concurrent_fetches,
            FetchContext {
                cache: Arc::clone(&cache),
                source,
                transport,
                decoder,
                invalidation: Arc::clone(&invalidation),
            },
        ));
        let coordinator =
            ViewportCoordinator::spawn(&runtime, Arc::clone(&loader), Arc::clone(&invalidation));

        log::debug!(
            "built tile layer '{}' with {} fetch workers",
            self.id,
            self.config.max_concurrent_fetches
        );

        Ok(TileLayer::from_parts(
            self.id,
            self.name,
            self.config,
            cache,
            loader,
            coordinator,
            invalidation,
        ))
    }
}

impl Default for TileLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
