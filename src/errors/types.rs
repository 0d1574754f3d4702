//! Error type definitions for the image cache
//!
//! Every fallible operation in the library returns [`CacheError`]. The variants
//! follow the cache's failure taxonomy: transport failures talking to the
//! remote catalog, malformed catalog payloads, lookup misses, and local I/O.

use thiserror::Error;

/// Top-level library error type
#[derive(Error, Debug)]
pub enum CacheError {
    /// Network failure before a response was received
    #[error("Transport error: {url} - {message}")]
    Transport { url: String, message: String },

    /// The remote service answered with a non-success status
    #[error("HTTP error: {status} - {url}")]
    Http { status: u16, url: String },

    /// The remote payload did not have the expected shape
    #[error("Format error: {message}")]
    Format { message: String },

    /// Ledger or blob lookup miss
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A record mutation that would break a ledger invariant
    #[error("Invalid transition for {id}: {message}")]
    InvalidTransition { id: String, message: String },

    /// Image decoding or encoding failures
    #[error("Image error: {message}")]
    Image { message: String },
}

impl CacheError {
    /// Create a transport error for a request URL
    pub fn transport<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format<S: Into<String>>(message: S) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition<I: Into<String>, M: Into<String>>(id: I, message: M) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Network or HTTP status failure
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http { .. })
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }

    /// Lookup miss, including a blob file that does not exist on disk
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        Self::Image {
            message: err.to_string(),
        }
    }
}
