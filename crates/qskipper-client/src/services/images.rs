use bytes::Bytes;
use tracing::{debug, warn};

use qskipper_shared::CacheKey;
use qskipper_store::ImageCache;

use crate::error::{ApiError, Result};
use crate::gateway::ApiGateway;

/// Read-through access to remote images.
#[derive(Debug, Clone)]
pub struct ImageService {
    gateway: ApiGateway,
    cache: ImageCache,
}

impl ImageService {
    pub fn new(gateway: ApiGateway, cache: ImageCache) -> Self {
        Self { gateway, cache }
    }

    /// Cached bytes when present, otherwise fetched without credentials and
    /// stored. A failed store does not fail the read.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ApiError::InvalidInput("image URL is empty".into()));
        }

        let key = CacheKey::for_identity(url);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.bytes);
        }

        let response = self.gateway.get_public(url).await?;
        if let Err(e) = self.cache.put(&key, response.body.clone()).await {
            warn!(key = %key, error = %e, "Failed to cache fetched image");
        }
        debug!(key = %key, size = response.body.len(), "Fetched image");
        Ok(response.body)
    }

    pub async fn clear(&self) -> Result<()> {
        Ok(self.cache.clear().await?)
    }
}
