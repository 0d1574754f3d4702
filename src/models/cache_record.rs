use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::catalog_item::CatalogItem;
use crate::utils::url::UrlUtils;

/// When a record was last surfaced to a caller
///
/// `Never` orders before every timestamp, so sorting ascending puts records
/// that were never shown first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastSeen {
    Never,
    At(DateTime<Utc>),
}

impl LastSeen {
    pub fn is_never(&self) -> bool {
        matches!(self, LastSeen::Never)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            LastSeen::Never => None,
            LastSeen::At(at) => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for LastSeen {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(LastSeen::Never, LastSeen::At)
    }
}

impl std::fmt::Display for LastSeen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LastSeen::Never => write!(f, "never"),
            LastSeen::At(at) => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

/// One cached remote image: catalog metadata plus local cache state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub id: String,
    /// Remote location of the full-resolution asset
    pub full_image_url: String,
    pub title: Option<String>,
    pub publisher_username: Option<String>,
    pub publisher_first_name: Option<String>,
    pub publisher_last_name: Option<String>,
    pub publisher_portfolio_url: Option<String>,
    /// Set only after the blob write succeeded
    pub downloaded: bool,
    pub last_seen: LastSeen,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Fresh record for an id first observed in a catalog batch
    pub fn from_catalog_item(item: &CatalogItem, now: DateTime<Utc>) -> Self {
        Self {
            id: item.image.id.clone(),
            full_image_url: item.image.full_image_url.clone(),
            title: item.image.title.clone(),
            publisher_username: item.publisher.username.clone(),
            publisher_first_name: item.publisher.first_name.clone(),
            publisher_last_name: item.publisher.last_name.clone(),
            publisher_portfolio_url: item.publisher.portfolio_url.clone(),
            downloaded: false,
            last_seen: LastSeen::Never,
            created_at: now,
            updated_at: now,
        }
    }

    /// Downloaded but never surfaced via selection
    pub fn is_downloaded_unseen(&self) -> bool {
        self.downloaded && self.last_seen.is_never()
    }

    /// Public Unsplash page for the photo
    pub fn image_human_url(&self) -> Option<Url> {
        UrlUtils::photo_page_url(&self.id)
    }

    /// Public Unsplash profile of the publisher, if the username is known
    pub fn publisher_human_url(&self) -> Option<Url> {
        self.publisher_username
            .as_deref()
            .and_then(UrlUtils::profile_url)
    }

    /// "First Last", falling back to the username
    pub fn publisher_display_name(&self) -> Option<String> {
        let full_name = [
            self.publisher_first_name.as_deref(),
            self.publisher_last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        if full_name.is_empty() {
            self.publisher_username.clone()
        } else {
            Some(full_name)
        }
    }
}
