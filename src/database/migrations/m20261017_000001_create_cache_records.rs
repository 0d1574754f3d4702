//! Create the cache_records ledger table
//!
//! One row per remote image id. `last_seen_at` stays NULL until the record is
//! first handed out by selection.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CacheRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CacheRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CacheRecords::FullImageUrl)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CacheRecords::Title).string().null())
                    .col(
                        ColumnDef::new(CacheRecords::PublisherUsername)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CacheRecords::PublisherFirstName)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CacheRecords::PublisherLastName)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CacheRecords::PublisherPortfolioUrl)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CacheRecords::Downloaded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(Self::create_timestamp_column(CacheRecords::LastSeenAt, true))
                    .col(Self::create_timestamp_column(CacheRecords::CreatedAt, false))
                    .col(Self::create_timestamp_column(CacheRecords::UpdatedAt, false))
                    .to_owned(),
            )
            .await?;

        // Serves both the downloaded-unseen count and the recency ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_cache_records_downloaded_last_seen")
                    .table(CacheRecords::Table)
                    .col(CacheRecords::Downloaded)
                    .col(CacheRecords::LastSeenAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CacheRecords::Table).to_owned())
            .await
    }
}

impl Migration {
    /// Timestamp column stored with its UTC offset
    fn create_timestamp_column(column_name: impl IntoIden, nullable: bool) -> ColumnDef {
        let mut column = ColumnDef::new(column_name);
        column.timestamp_with_time_zone();
        if nullable {
            column.null();
        } else {
            column.not_null();
        }
        column.to_owned()
    }
}

/// Entity identifiers for the cache_records table
#[derive(DeriveIden)]
pub enum CacheRecords {
    Table,
    Id,
    FullImageUrl,
    Title,
    PublisherUsername,
    PublisherFirstName,
    PublisherLastName,
    PublisherPortfolioUrl,
    Downloaded,
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}
