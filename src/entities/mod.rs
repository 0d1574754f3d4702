//! SeaORM entity definitions

pub mod prelude;

pub mod cache_records;
