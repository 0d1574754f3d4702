//! Remote catalog abstraction
//!
//! A catalog answers two kinds of request: a batch of candidate metadata and
//! the bytes of a single asset. The batch request is split into building the
//! URL, transferring the body and parsing it, so the refill pipeline can
//! report progress between the steps.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::errors::CacheResult;
use crate::models::CatalogItem;

#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Request URL for a batch of `count` candidates
    fn batch_url(&self, count: usize, collections: Option<&[String]>) -> CacheResult<Url>;

    /// Transfer the raw batch response
    ///
    /// Network failures map to `Transport`, non-2xx responses to `Http`.
    async fn fetch_batch_body(&self, url: &Url) -> CacheResult<Bytes>;

    /// Parse a batch body; any malformed element fails the whole batch
    fn parse_batch(&self, body: &[u8]) -> CacheResult<Vec<CatalogItem>> {
        super::unsplash::parse_batch(body)
    }

    /// Download the bytes of one asset
    async fn fetch_asset(&self, url: &str) -> CacheResult<Bytes>;

    /// Build, transfer and parse a batch in one call
    async fn fetch(
        &self,
        count: usize,
        collections: Option<&[String]>,
    ) -> CacheResult<Vec<CatalogItem>> {
        let url = self.batch_url(count, collections)?;
        let body = self.fetch_batch_body(&url).await?;
        self.parse_batch(&body)
    }
}
