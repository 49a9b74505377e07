use crate::core::config::TileLoadingConfig;
use crate::core::constants::{DEFAULT_SUBDOMAINS, DEFAULT_URL_TEMPLATE};
use crate::core::geo::TileCoord;
use rand::Rng;

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

/// Leaflet-style URL template: `{s}` is replaced by a mirror subdomain picked
/// at random per request, `{z}`, `{x}` and `{y}` by the tile coordinate.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    template: String,
    subdomains: Vec<String>,
}

impl TemplateSource {
    pub fn new(template: impl Into<String>, subdomains: Vec<String>) -> Self {
        Self {
            template: template.into(),
            subdomains,
        }
    }

    pub fn from_config(config: &TileLoadingConfig) -> Self {
        Self::new(config.url_template.clone(), config.subdomains.clone())
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    fn pick_subdomain(&self) -> &str {
        match self.subdomains.len() {
            0 => "",
            1 => &self.subdomains[0],
            n => &self.subdomains[rand::rng().random_range(0..n)],
        }
    }
}

impl TileSource for TemplateSource {
    fn url(&self, coord: TileCoord) -> String {
        self.template
            .replace("{s}", self.pick_subdomain())
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }
}

/// The public OpenStreetMap tile servers and their `a`/`b`/`c` mirrors.
#[derive(Debug, Clone)]
pub struct OpenStreetMapSource {
    inner: TemplateSource,
}

impl OpenStreetMapSource {
    pub fn new() -> Self {
        Self {
            inner: TemplateSource::new(
                DEFAULT_URL_TEMPLATE,
                DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            ),
        }
    }
}

impl Default for OpenStreetMapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TileSource for OpenStreetMapSource {
    fn url(&self, coord: TileCoord) -> String {
        self.inner.url(coord)
    }
}
