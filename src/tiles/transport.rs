//! Byte transport for tile downloads

use crate::core::config::TileLoadingConfig;
use crate::{MapError, Result};
use async_trait::async_trait;

/// Capability to fetch the body behind a URL.
///
/// One call is one attempt: implementations must not retry. A non-success
/// status is an error.
#[async_trait]
pub trait TileTransport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &TileLoadingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_concurrent_fetches)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TileTransport for ReqwestTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(MapError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
