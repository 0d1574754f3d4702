//! Centralized error handling for the image cache
//!
//! # Error Categories
//!
//! - **Transport Errors**: network failures and non-success HTTP statuses
//! - **Format Errors**: catalog responses missing required fields
//! - **Not Found**: ledger or blob lookup misses
//! - **I/O Errors**: local blob reads and writes
//!
//! # Usage
//!
//! ```rust
//! use unsplash_cache::errors::{CacheError, CacheResult};
//!
//! fn lookup(id: &str) -> CacheResult<String> {
//!     Err(CacheError::not_found("cache record", id))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using CacheError
pub type CacheResult<T> = Result<T, CacheError>;
