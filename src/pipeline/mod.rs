//! Cache refill pipeline
//!
//! One refill walks through threshold check, catalog fetch, deduplication
//! against the ledger and a bounded concurrent download fan-out. Every refill
//! ends with exactly one terminal [`CacheStatus`] event. All events are
//! emitted from the task driving the refill, so observers see them in order;
//! download tasks only report back through their join handles.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::config::defaults::MAX_BATCH_COUNT;
use crate::errors::{CacheError, CacheResult};
use crate::models::{CacheRecord, CatalogItem};
use crate::repositories::RecordLedger;
use crate::sources::RemoteCatalog;
use crate::status::{CacheStatus, StatusChannel};
use crate::storage::AssetBlobStore;
use crate::utils::url::UrlUtils;

/// Refill policy knobs taken from [`Config`]
#[derive(Debug, Clone)]
pub struct RefillSettings {
    /// Skip the refill once this many downloaded-unseen records exist
    pub target_unused_count: usize,
    pub max_concurrent_downloads: usize,
    pub collections: Option<Vec<String>>,
}

impl From<&Config> for RefillSettings {
    fn from(config: &Config) -> Self {
        Self {
            target_unused_count: config.cache.target_unused_count,
            max_concurrent_downloads: config.cache.max_concurrent_downloads,
            collections: config.unsplash.collections.clone(),
        }
    }
}

/// Counters for a refill that got past the threshold check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefillReport {
    /// Candidates returned by the catalog
    pub fetched: usize,
    /// Candidates dropped as already downloaded or repeated in the batch
    pub skipped: usize,
    /// Downloads started
    pub attempted: usize,
    pub succeeded: usize,
    pub cancelled: bool,
}

/// How a refill ended; mirrors the terminal status event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Enough unseen images were cached, nothing was fetched
    Skipped { unseen: u64 },
    /// The catalog request or the ledger failed before any download started
    Failed,
    Completed(RefillReport),
}

impl RefillOutcome {
    pub fn succeeded(&self) -> usize {
        match self {
            RefillOutcome::Completed(report) => report.succeeded,
            _ => 0,
        }
    }
}

/// Why a single download did not make it into the cache
#[derive(Error, Debug)]
enum DownloadFailure {
    #[error("Could not download image {id}: {source}")]
    Download { id: String, source: CacheError },
    #[error("Could not save image {id}: {source}")]
    Save { id: String, source: CacheError },
    #[error("Could not mark image {id} downloaded: {source}")]
    Ledger { id: String, source: CacheError },
}

/// A candidate that still needs its bytes
#[derive(Debug, Clone)]
struct PendingDownload {
    id: String,
    url: String,
}

#[derive(Clone)]
pub struct RefillPipeline {
    ledger: RecordLedger,
    store: AssetBlobStore,
    catalog: Arc<dyn RemoteCatalog>,
    status: StatusChannel,
    settings: RefillSettings,
    running: Arc<Mutex<()>>,
}

impl RefillPipeline {
    pub fn new(
        ledger: RecordLedger,
        store: AssetBlobStore,
        catalog: Arc<dyn RemoteCatalog>,
        status: StatusChannel,
        settings: RefillSettings,
    ) -> Self {
        Self {
            ledger,
            store,
            catalog,
            status,
            settings,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &RefillSettings {
        &self.settings
    }

    /// Run one refill to completion
    pub async fn refill(&self, count: usize) -> RefillOutcome {
        self.refill_with_cancellation(count, CancellationToken::new())
            .await
    }

    /// Run one refill on a background task
    pub fn spawn_refill(&self, count: usize) -> JoinHandle<RefillOutcome> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.refill(count).await })
    }

    /// Run one refill that stops early when `cancel` fires
    ///
    /// Downloads already committed to the ledger stay valid; in-flight ones
    /// are aborted before their ledger update. The terminal event is still
    /// emitted.
    pub async fn refill_with_cancellation(
        &self,
        count: usize,
        cancel: CancellationToken,
    ) -> RefillOutcome {
        // One refill at a time per pipeline
        let _running = self.running.lock().await;

        let unseen = match self.ledger.downloaded_unseen_count().await {
            Ok(unseen) => unseen,
            Err(e) => return self.fail(format!("Could not read cache ledger: {e}")),
        };
        if unseen >= self.settings.target_unused_count as u64 {
            info!(
                "Skipping refill: {} unseen images cached (target {})",
                unseen, self.settings.target_unused_count
            );
            self.status.emit(CacheStatus::SkipFetchTargetUnseenReached);
            return RefillOutcome::Skipped { unseen };
        }

        if count == 0 {
            return self.complete(RefillReport::default());
        }
        if count > MAX_BATCH_COUNT {
            warn!(
                "Requested {} images, clamping to {}",
                count, MAX_BATCH_COUNT
            );
        }
        let count = count.min(MAX_BATCH_COUNT);

        if cancel.is_cancelled() {
            return self.complete(RefillReport {
                cancelled: true,
                ..RefillReport::default()
            });
        }

        let items = match self.fetch_candidates(count, &cancel).await {
            Some(Ok(items)) => items,
            Some(Err(e)) => return self.fail(format!("Could not fetch images: {e}")),
            None => {
                return self.complete(RefillReport {
                    cancelled: true,
                    ..RefillReport::default()
                });
            }
        };

        let fetched = items.len();
        let pending = match self.deduplicate(items).await {
            Ok(pending) => pending,
            Err(e) => return self.fail(format!("Could not update cache ledger: {e}")),
        };
        debug!(
            "Refill batch: {} fetched, {} need download",
            fetched,
            pending.len()
        );

        let attempted = pending.len();
        let (succeeded, cancelled) = self.download_all(pending, &cancel).await;

        self.complete(RefillReport {
            fetched,
            skipped: fetched - attempted,
            attempted,
            succeeded,
            cancelled,
        })
    }

    /// Request and parse one catalog batch; `None` when cancelled mid-request
    async fn fetch_candidates(
        &self,
        count: usize,
        cancel: &CancellationToken,
    ) -> Option<CacheResult<Vec<CatalogItem>>> {
        let url = match self
            .catalog
            .batch_url(count, self.settings.collections.as_deref())
        {
            Ok(url) => url,
            Err(e) => return Some(Err(e)),
        };

        self.status.emit(CacheStatus::Requesting {
            path: UrlUtils::obfuscate_credentials(url.as_str()),
        });

        let body = tokio::select! {
            _ = cancel.cancelled() => return None,
            body = self.catalog.fetch_batch_body(&url) => body,
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => return Some(Err(e)),
        };
        self.status.emit(CacheStatus::RequestApiSuccess);

        Some(self.catalog.parse_batch(&body))
    }

    /// Decide per candidate: register and download, retry, or drop
    ///
    /// Runs sequentially so a repeated id later in the batch sees the
    /// decision made for its first occurrence.
    async fn deduplicate(&self, items: Vec<CatalogItem>) -> CacheResult<Vec<PendingDownload>> {
        let now = Utc::now();
        let mut batch_ids = HashSet::new();
        let mut pending = Vec::new();

        for item in items {
            if !batch_ids.insert(item.id().to_string()) {
                trace!("Dropping repeated id {} within batch", item.id());
                continue;
            }

            match self.ledger.find_by_id(item.id()).await? {
                None => {
                    self.ledger
                        .upsert(&CacheRecord::from_catalog_item(&item, now))
                        .await?;
                    trace!("Registered new image {}", item.id());
                }
                Some(record) if !record.downloaded => {
                    debug!("Retrying incomplete download of {}", record.id);
                }
                Some(record) => {
                    trace!("Image {} already cached", record.id);
                    continue;
                }
            }

            pending.push(PendingDownload {
                id: item.image.id,
                url: item.image.full_image_url,
            });
        }

        Ok(pending)
    }

    /// Fan out downloads; returns the success count and whether it was cancelled
    async fn download_all(
        &self,
        pending: Vec<PendingDownload>,
        cancel: &CancellationToken,
    ) -> (usize, bool) {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_downloads.max(1)));
        let mut tasks = JoinSet::new();

        for download in pending {
            let permits = permits.clone();
            let catalog = self.catalog.clone();
            let store = self.store.clone();
            let ledger = self.ledger.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only waits
                let _permit = permits.acquire_owned().await;
                Self::download_one(catalog.as_ref(), &store, &ledger, download).await
            });
        }

        let mut succeeded = 0;
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    info!("Refill cancelled, aborting {} pending download(s)", tasks.len());
                    cancelled = true;
                    tasks.abort_all();
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(id))) => {
                        trace!("Cached image {}", id);
                        succeeded += 1;
                    }
                    Some(Ok(Err(failure))) => self.status.error(failure.to_string()),
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => self.status.error(format!("Download task failed: {e}")),
                },
            }
        }

        (succeeded, cancelled)
    }

    async fn download_one(
        catalog: &dyn RemoteCatalog,
        store: &AssetBlobStore,
        ledger: &RecordLedger,
        download: PendingDownload,
    ) -> Result<String, DownloadFailure> {
        let PendingDownload { id, url } = download;

        let bytes = match catalog.fetch_asset(&url).await {
            Ok(bytes) => bytes,
            Err(source) => return Err(DownloadFailure::Download { id, source }),
        };
        if let Err(source) = store.put(&id, &bytes).await {
            return Err(DownloadFailure::Save { id, source });
        }
        if let Err(source) = ledger.mark_downloaded(&id).await {
            return Err(DownloadFailure::Ledger { id, source });
        }

        Ok(id)
    }

    fn fail(&self, description: String) -> RefillOutcome {
        self.status.error(description);
        self.status
            .emit(CacheStatus::RequestImagesDone { succeeded: 0 });
        RefillOutcome::Failed
    }

    fn complete(&self, report: RefillReport) -> RefillOutcome {
        info!(
            "Refill finished: {} of {} download(s) succeeded",
            report.succeeded, report.attempted
        );
        self.status.emit(CacheStatus::RequestImagesDone {
            succeeded: report.succeeded,
        });
        RefillOutcome::Completed(report)
    }
}
