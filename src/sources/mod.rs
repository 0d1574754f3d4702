//! Remote catalog implementations

pub mod traits;
pub mod unsplash;

pub use traits::RemoteCatalog;
pub use unsplash::{UnsplashCatalog, parse_batch};
