pub use super::cache_records::Entity as CacheRecords;
