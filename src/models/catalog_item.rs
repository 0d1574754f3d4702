use serde::{Deserialize, Serialize};

/// Image metadata returned by the remote catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub id: String,
    pub full_image_url: String,
    /// Location title, when the photographer supplied one
    pub title: Option<String>,
}

/// Attribution metadata for the photographer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherMeta {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub portfolio_url: Option<String>,
}

/// One candidate from a catalog batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub image: ImageMeta,
    pub publisher: PublisherMeta,
}

impl CatalogItem {
    pub fn id(&self) -> &str {
        &self.image.id
    }
}
