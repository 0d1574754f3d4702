//! SeaORM migrations for the cache ledger

use sea_orm_migration::prelude::*;

pub mod m20261017_000001_create_cache_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20261017_000001_create_cache_records::Migration)]
    }
}
