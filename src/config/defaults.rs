/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Remote catalog defaults
pub const DEFAULT_ENDPOINT: &str = "https://api.unsplash.com/photos/random";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";
// Note: client_id is the ONLY truly mandatory field with no default

/// Upper bound Unsplash accepts for `count` on the random endpoint
pub const MAX_BATCH_COUNT: usize = 30;

// Cache defaults
pub const DEFAULT_CACHE_ROOT: &str = "./data/image-cache";
pub const DEFAULT_TARGET_UNUSED_COUNT: usize = 10;
pub const DEFAULT_IMAGE_COUNT: usize = 3;
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;

// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/image-cache.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Logging defaults
pub const DEFAULT_DEBUG_LOGGING: bool = true;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "UNSPLASH_CACHE_";
