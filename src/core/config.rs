//! Configuration for tile acquisition
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! yields a usable configuration. Presets cover the common variations.

use crate::core::constants::{
    DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SUBDOMAINS,
    DEFAULT_URL_TEMPLATE, DEFAULT_USER_AGENT,
};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoadingConfig {
    /// Maximum fetches executing at once; further requests wait in FIFO order
    pub max_concurrent_fetches: usize,
    /// Tile URL with `{s}`, `{z}`, `{x}` and `{y}` placeholders
    pub url_template: String,
    /// Mirrors substituted for `{s}`, one picked at random per request
    pub subdomains: Vec<String>,
    pub user_agent: String,
    pub request_timeout_ms: u64,
    /// Drop fetches that are still queued when the viewport changes
    pub cancel_queued_fetches_on_viewport_change: bool,
}

impl Default for TileLoadingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            subdomains: DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            cancel_queued_fetches_on_viewport_change: false,
        }
    }
}

impl TileLoadingConfig {
    /// Small pool that also drops queued fetches whenever the viewport
    /// changes. Fetches a superseded scan already submitted may therefore
    /// be withdrawn before they run; only running fetches always finish.
    pub fn low_resource() -> Self {
        Self {
            max_concurrent_fetches: 4,
            cancel_queued_fetches_on_viewport_change: true,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            max_concurrent_fetches: 2,
            request_timeout_ms: 2_000,
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(MapError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.url_template.contains("{s}") && self.subdomains.is_empty() {
            return Err(MapError::Config(
                "url_template uses {s} but no subdomains are configured".to_string(),
            ));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                return Err(MapError::Config(format!(
                    "url_template is missing {}",
                    placeholder
                )));
            }
        }
        Ok(())
    }
}
