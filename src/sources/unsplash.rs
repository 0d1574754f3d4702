//! Unsplash random-photo catalog
//!
//! Talks to `GET /photos/random?client_id=..&count=..[&collections=..]`,
//! which answers with a JSON array of photo objects.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};
use url::Url;

use super::traits::RemoteCatalog;
use crate::config::UnsplashConfig;
use crate::errors::{CacheError, CacheResult};
use crate::models::{CatalogItem, ImageMeta, PublisherMeta};
use crate::utils::url::UrlUtils;

const USER_AGENT: &str = concat!("unsplash-cache/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RawPhoto {
    id: String,
    urls: RawUrls,
    #[serde(default, deserialize_with = "lenient")]
    location: Option<RawLocation>,
    #[serde(default, deserialize_with = "lenient")]
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUrls {
    full: String,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUser {
    #[serde(default, deserialize_with = "lenient")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    portfolio_url: Option<String>,
}

/// Attribution fields are optional: a value of the wrong type reads as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl From<RawPhoto> for CatalogItem {
    fn from(raw: RawPhoto) -> Self {
        let user = raw.user.unwrap_or_default();
        CatalogItem {
            image: ImageMeta {
                id: raw.id,
                full_image_url: raw.urls.full,
                title: raw.location.and_then(|l| l.title),
            },
            publisher: PublisherMeta {
                username: user.username,
                first_name: user.first_name,
                last_name: user.last_name,
                portfolio_url: user.portfolio_url,
            },
        }
    }
}

/// Parse an Unsplash batch response
///
/// Every element must carry `id` and `urls.full`; one bad element rejects the
/// whole batch with `Format`. Location and user fields are best-effort.
pub fn parse_batch(body: &[u8]) -> CacheResult<Vec<CatalogItem>> {
    let photos: Vec<RawPhoto> = serde_json::from_slice(body)
        .map_err(|e| CacheError::format(format!("unexpected catalog response: {e}")))?;

    if let Some(index) = photos.iter().position(|p| p.id.trim().is_empty()) {
        return Err(CacheError::format(format!(
            "catalog element {index} has an empty id"
        )));
    }

    Ok(photos.into_iter().map(CatalogItem::from).collect())
}

/// Unsplash-backed [`RemoteCatalog`]
pub struct UnsplashCatalog {
    client: Client,
    endpoint: String,
    client_id: String,
}

impl UnsplashCatalog {
    pub fn new(config: &UnsplashConfig) -> CacheResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CacheError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
        })
    }

    async fn get_bytes(&self, url: &str) -> CacheResult<Bytes> {
        let display_url = UrlUtils::obfuscate_credentials(url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::transport(display_url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Request to {} returned {}", display_url, status);
            return Err(CacheError::Http {
                status: status.as_u16(),
                url: display_url,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| CacheError::transport(display_url, e.to_string()))
    }
}

#[async_trait]
impl RemoteCatalog for UnsplashCatalog {
    fn batch_url(&self, count: usize, collections: Option<&[String]>) -> CacheResult<Url> {
        UrlUtils::build_batch_url(&self.endpoint, &self.client_id, count, collections).map_err(
            |e| CacheError::configuration(format!("invalid endpoint {}: {e}", self.endpoint)),
        )
    }

    async fn fetch_batch_body(&self, url: &Url) -> CacheResult<Bytes> {
        let body = self.get_bytes(url.as_str()).await?;
        debug!("Catalog batch response: {} bytes", body.len());
        Ok(body)
    }

    async fn fetch_asset(&self, url: &str) -> CacheResult<Bytes> {
        self.get_bytes(url).await
    }
}
