//! Deduplicated local cache of Unsplash images
//!
//! [`UnsplashImageCache`] keeps a SQLite ledger of every image id seen from the
//! remote catalog plus one blob file per downloaded image. A refill tops the
//! cache up when the supply of downloaded-but-unseen images runs low, and
//! selection hands images out least-recently-seen first.

pub mod cache;
pub mod config;
pub mod database;
pub mod entities;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod repositories;
pub mod services;
pub mod sources;
pub mod status;
pub mod storage;
pub mod utils;

pub use cache::{CacheStats, UnsplashImageCache};
pub use config::Config;
pub use errors::{CacheError, CacheResult};
pub use models::{CacheRecord, CatalogItem, LastSeen};
pub use pipeline::{RefillOutcome, RefillReport};
pub use status::CacheStatus;
