//! Domain models shared by the ledger, the catalog and the pipeline

pub mod cache_record;
pub mod catalog_item;

pub use cache_record::{CacheRecord, LastSeen};
pub use catalog_item::{CatalogItem, ImageMeta, PublisherMeta};
