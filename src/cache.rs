//! Image cache facade
//!
//! Wires configuration, the ledger, the blob store, the catalog and the status
//! stream into one handle.

use bytes::Bytes;
use image::DynamicImage;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::database::Database;
use crate::errors::CacheResult;
use crate::models::CacheRecord;
use crate::pipeline::{RefillOutcome, RefillPipeline, RefillSettings};
use crate::repositories::RecordLedger;
use crate::services::SelectionService;
use crate::sources::{RemoteCatalog, UnsplashCatalog};
use crate::status::{StatusChannel, StatusReceiver};
use crate::storage::AssetBlobStore;

/// Counts reported by [`UnsplashImageCache::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub records: u64,
    pub downloaded: u64,
    pub downloaded_unseen: u64,
}

#[derive(Clone)]
pub struct UnsplashImageCache {
    config: Config,
    ledger: RecordLedger,
    status: StatusChannel,
    pipeline: RefillPipeline,
    selection: Arc<SelectionService>,
}

impl UnsplashImageCache {
    /// Validate the configuration, open and migrate the ledger, use the Unsplash catalog
    pub async fn new(config: Config) -> CacheResult<Self> {
        config.validate()?;
        let catalog = Arc::new(UnsplashCatalog::new(&config.unsplash)?);
        Self::with_catalog(config, catalog).await
    }

    /// Same as [`Self::new`] with a caller-supplied catalog
    pub async fn with_catalog(
        config: Config,
        catalog: Arc<dyn RemoteCatalog>,
    ) -> CacheResult<Self> {
        let database = Database::connect_and_migrate(&config.database).await?;
        let ledger = RecordLedger::new(database.connection());
        let store = AssetBlobStore::new(config.cache.root.clone());
        let status = StatusChannel::new();

        let pipeline = RefillPipeline::new(
            ledger.clone(),
            store.clone(),
            catalog,
            status.clone(),
            RefillSettings::from(&config),
        );
        let selection = Arc::new(SelectionService::new(ledger.clone(), store));

        info!(
            "Image cache ready at {} (target {} unseen)",
            config.cache.root.display(),
            config.cache.target_unused_count
        );

        Ok(Self {
            config,
            ledger,
            status,
            pipeline,
            selection,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &RecordLedger {
        &self.ledger
    }

    /// Status events from now on
    pub fn subscribe(&self) -> StatusReceiver {
        self.status.subscribe()
    }

    /// Top up the cache with `image_count` candidates, or the configured default
    pub async fn pre_cache(&self, image_count: Option<usize>) -> RefillOutcome {
        self.pipeline
            .refill(self.image_count(image_count))
            .await
    }

    pub async fn pre_cache_with_cancellation(
        &self,
        image_count: Option<usize>,
        cancel: CancellationToken,
    ) -> RefillOutcome {
        self.pipeline
            .refill_with_cancellation(self.image_count(image_count), cancel)
            .await
    }

    /// Top up the cache on a background task
    pub fn spawn_pre_cache(&self, image_count: Option<usize>) -> JoinHandle<RefillOutcome> {
        self.pipeline.spawn_refill(self.image_count(image_count))
    }

    pub async fn next_unseen(&self) -> Option<(Bytes, CacheRecord)> {
        self.selection.select_unseen().await
    }

    pub async fn next_unseen_image(&self) -> Option<(DynamicImage, CacheRecord)> {
        self.selection.select_unseen_image().await
    }

    pub async fn next_unseen_cropped(
        &self,
        width: u32,
        height: u32,
    ) -> Option<(DynamicImage, CacheRecord)> {
        self.selection.select_unseen_cropped(width, height).await
    }

    pub async fn list_records(&self) -> CacheResult<Vec<CacheRecord>> {
        self.ledger.list_all().await
    }

    pub async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats {
            records: self.ledger.count_all().await?,
            downloaded: self.ledger.downloaded_count().await?,
            downloaded_unseen: self.ledger.downloaded_unseen_count().await?,
        })
    }

    fn image_count(&self, image_count: Option<usize>) -> usize {
        image_count.unwrap_or(self.config.cache.default_image_count)
    }
}
