//! Repository layer over the SeaORM entities

pub mod cache_record;

pub use cache_record::CacheRecordSeaOrmRepository;

/// The durable id -> record map used by the pipeline and selection
pub type RecordLedger = CacheRecordSeaOrmRepository;
