//! Filesystem blob store for downloaded image bytes
//!
//! One file per image id, named by the id with no extension, directly under
//! the cache root. Writes land in a temporary sibling first and are renamed
//! into place, so readers never observe a partially written blob.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::{CacheError, CacheResult};

const RESOURCE: &str = "image blob";
const TEMP_SUFFIX: &str = ".part";

#[derive(Clone)]
pub struct AssetBlobStore {
    root: PathBuf,
    root_ready: Arc<OnceCell<()>>,
}

impl AssetBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            root_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob for `id`
    pub fn path_for(&self, id: &str) -> CacheResult<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.root.join(id))
    }

    /// Create the root directory, at most once per store
    async fn ensure_root(&self) -> CacheResult<()> {
        self.root_ready
            .get_or_try_init(|| async {
                if !fs::try_exists(&self.root).await? {
                    fs::create_dir_all(&self.root).await?;
                    info!("Created image cache directory: {}", self.root.display());
                }
                Ok::<(), CacheError>(())
            })
            .await?;
        Ok(())
    }

    /// Store the bytes for `id`, replacing any previous blob
    pub async fn put(&self, id: &str, data: &[u8]) -> CacheResult<PathBuf> {
        let path = self.path_for(id)?;
        self.ensure_root().await?;

        let temp_path = self.root.join(format!("{id}{TEMP_SUFFIX}"));
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!("Stored {} bytes for image {}", data.len(), id);
        Ok(path)
    }

    /// Read the bytes for `id`; a missing blob is `NotFound`
    pub async fn get(&self, id: &str) -> CacheResult<Bytes> {
        let path = self.path_for(id)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::not_found(RESOURCE, id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, id: &str) -> CacheResult<bool> {
        let path = self.path_for(id)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Ids come from a remote service and become file names verbatim
    fn validate_id(id: &str) -> CacheResult<()> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.ends_with(TEMP_SUFFIX)
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if valid {
            Ok(())
        } else {
            Err(CacheError::format(format!(
                "image id {id:?} is not usable as a file name"
            )))
        }
    }
}
