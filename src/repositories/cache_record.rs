//! SeaORM-based cache record ledger
//!
//! The ledger is the durable map from image id to [`CacheRecord`]. Single-id
//! read-modify-write goes through [`CacheRecordSeaOrmRepository::update`],
//! which serializes mutations per id and runs each one inside a transaction.
//! Different ids never wait on each other.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, NullOrdering, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use crate::entities::{cache_records, prelude::CacheRecords};
use crate::errors::{CacheError, CacheResult};
use crate::models::{CacheRecord, LastSeen};

const RESOURCE: &str = "cache record";

/// Per-id mutation locks
#[derive(Default)]
struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds any more
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// SeaORM-based repository for cache records
#[derive(Clone)]
pub struct CacheRecordSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
    locks: Arc<RecordLocks>,
}

impl CacheRecordSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self {
            connection,
            locks: Arc::new(RecordLocks::default()),
        }
    }

    /// Insert a record, or refresh the catalog metadata of an existing one
    ///
    /// `downloaded`, `last_seen_at` and `created_at` of an existing row are
    /// left untouched; only metadata columns are replaced on conflict.
    pub async fn upsert(&self, record: &CacheRecord) -> CacheResult<CacheRecord> {
        let _guard = self.locks.acquire(&record.id).await;

        let active_model = cache_records::ActiveModel {
            id: Set(record.id.clone()),
            full_image_url: Set(record.full_image_url.clone()),
            title: Set(record.title.clone()),
            publisher_username: Set(record.publisher_username.clone()),
            publisher_first_name: Set(record.publisher_first_name.clone()),
            publisher_last_name: Set(record.publisher_last_name.clone()),
            publisher_portfolio_url: Set(record.publisher_portfolio_url.clone()),
            downloaded: Set(record.downloaded),
            last_seen_at: Set(record.last_seen.timestamp()),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };

        CacheRecords::insert(active_model)
            .on_conflict(
                OnConflict::column(cache_records::Column::Id)
                    .update_columns([
                        cache_records::Column::FullImageUrl,
                        cache_records::Column::Title,
                        cache_records::Column::PublisherUsername,
                        cache_records::Column::PublisherFirstName,
                        cache_records::Column::PublisherLastName,
                        cache_records::Column::PublisherPortfolioUrl,
                        cache_records::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await?;

        trace!("Upserted cache record {}", record.id);

        self.find_by_id(&record.id)
            .await?
            .ok_or_else(|| CacheError::not_found(RESOURCE, record.id.as_str()))
    }

    /// Point lookup
    pub async fn find_by_id(&self, id: &str) -> CacheResult<Option<CacheRecord>> {
        let model = CacheRecords::find_by_id(id.to_string())
            .one(&*self.connection)
            .await?;
        Ok(model.map(CacheRecord::from))
    }

    /// Point lookup that treats a miss as an error
    pub async fn get(&self, id: &str) -> CacheResult<CacheRecord> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| CacheError::not_found(RESOURCE, id))
    }

    /// Records whose bytes are cached but which were never selected
    pub async fn downloaded_unseen_count(&self) -> CacheResult<u64> {
        let count = CacheRecords::find()
            .filter(cache_records::Column::Downloaded.eq(true))
            .filter(cache_records::Column::LastSeenAt.is_null())
            .count(&*self.connection)
            .await?;
        Ok(count)
    }

    pub async fn downloaded_count(&self) -> CacheResult<u64> {
        let count = CacheRecords::find()
            .filter(cache_records::Column::Downloaded.eq(true))
            .count(&*self.connection)
            .await?;
        Ok(count)
    }

    pub async fn count_all(&self) -> CacheResult<u64> {
        Ok(CacheRecords::find().count(&*self.connection).await?)
    }

    /// Downloaded records, least recently seen first (never-seen before any
    /// timestamp), ties broken by id
    pub async fn downloaded_records(&self) -> CacheResult<Vec<CacheRecord>> {
        let models = Self::downloaded_by_recency()
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(CacheRecord::from).collect())
    }

    /// Head of [`Self::downloaded_records`]
    pub async fn least_recently_seen(&self) -> CacheResult<Option<CacheRecord>> {
        let model = Self::downloaded_by_recency()
            .one(&*self.connection)
            .await?;
        Ok(model.map(CacheRecord::from))
    }

    /// Most recent selection time across all records
    pub async fn latest_seen(&self) -> CacheResult<Option<DateTime<Utc>>> {
        let model = CacheRecords::find()
            .filter(cache_records::Column::LastSeenAt.is_not_null())
            .order_by_desc(cache_records::Column::LastSeenAt)
            .one(&*self.connection)
            .await?;
        Ok(model.and_then(|m| m.last_seen_at))
    }

    /// Every record, ordered by id
    pub async fn list_all(&self) -> CacheResult<Vec<CacheRecord>> {
        let models = CacheRecords::find()
            .order_by_asc(cache_records::Column::Id)
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(CacheRecord::from).collect())
    }

    fn downloaded_by_recency() -> sea_orm::Select<CacheRecords> {
        CacheRecords::find()
            .filter(cache_records::Column::Downloaded.eq(true))
            .order_by_with_nulls(
                cache_records::Column::LastSeenAt,
                Order::Asc,
                NullOrdering::First,
            )
            .order_by_asc(cache_records::Column::Id)
    }

    /// Atomic read-modify-write of a single record
    ///
    /// Fails with `NotFound` when the id is absent. The mutator may not change
    /// the id or move `last_seen` backwards; either fails with
    /// `InvalidTransition` and leaves the row untouched.
    pub async fn update<F>(&self, id: &str, mutator: F) -> CacheResult<CacheRecord>
    where
        F: FnOnce(&mut CacheRecord) + Send,
    {
        let _guard = self.locks.acquire(id).await;
        let txn = self.connection.begin().await?;

        // Claim the row with a no-op write first so SQLite takes the write
        // lock up front instead of upgrading a read lock later
        let claimed = CacheRecords::update_many()
            .col_expr(
                cache_records::Column::Id,
                Expr::col(cache_records::Column::Id).into(),
            )
            .filter(cache_records::Column::Id.eq(id))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(CacheError::not_found(RESOURCE, id));
        }

        let model = CacheRecords::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_else(|| CacheError::not_found(RESOURCE, id))?;

        let current = CacheRecord::from(model.clone());
        let mut next = current.clone();
        mutator(&mut next);

        if next.id != current.id {
            return Err(CacheError::invalid_transition(id, "record id cannot change"));
        }
        if next.last_seen < current.last_seen {
            return Err(CacheError::invalid_transition(
                id,
                format!(
                    "last_seen cannot move backwards ({} -> {})",
                    current.last_seen, next.last_seen
                ),
            ));
        }
        if next == current {
            txn.commit().await?;
            return Ok(current);
        }

        let mut active_model: cache_records::ActiveModel = model.into();
        active_model.full_image_url = Set(next.full_image_url);
        active_model.title = Set(next.title);
        active_model.publisher_username = Set(next.publisher_username);
        active_model.publisher_first_name = Set(next.publisher_first_name);
        active_model.publisher_last_name = Set(next.publisher_last_name);
        active_model.publisher_portfolio_url = Set(next.publisher_portfolio_url);
        active_model.downloaded = Set(next.downloaded);
        active_model.last_seen_at = Set(next.last_seen.timestamp());
        active_model.updated_at = Set(Utc::now());

        let updated = active_model.update(&txn).await?;
        txn.commit().await?;

        Ok(CacheRecord::from(updated))
    }

    /// Flag the record's blob as present
    pub async fn mark_downloaded(&self, id: &str) -> CacheResult<CacheRecord> {
        debug!("Marking {} downloaded", id);
        self.update(id, |record| record.downloaded = true).await
    }

    /// Clear the downloaded flag after the blob was found missing
    pub async fn mark_missing(&self, id: &str) -> CacheResult<CacheRecord> {
        self.update(id, |record| record.downloaded = false).await
    }

    /// Record a selection; an older timestamp than the stored one is ignored
    pub async fn mark_seen(&self, id: &str, at: DateTime<Utc>) -> CacheResult<CacheRecord> {
        self.update(id, |record| {
            record.last_seen = record.last_seen.max(LastSeen::At(at));
        })
        .await
    }
}

impl From<cache_records::Model> for CacheRecord {
    fn from(model: cache_records::Model) -> Self {
        Self {
            id: model.id,
            full_image_url: model.full_image_url,
            title: model.title,
            publisher_username: model.publisher_username,
            publisher_first_name: model.publisher_first_name,
            publisher_last_name: model.publisher_last_name,
            publisher_portfolio_url: model.publisher_portfolio_url,
            downloaded: model.downloaded,
            last_seen: LastSeen::from(model.last_seen_at),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
