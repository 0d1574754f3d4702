//! Unseen-image selection
//!
//! Hands out downloaded images least-recently-seen first. Every selection
//! stamps the record with a timestamp strictly later than any previously
//! recorded one, so repeated calls cycle through all downloaded images before
//! showing any of them again.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use image::{DynamicImage, GenericImageView};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::errors::CacheResult;
use crate::models::CacheRecord;
use crate::repositories::RecordLedger;
use crate::storage::AssetBlobStore;

/// Issues strictly increasing selection timestamps
#[derive(Debug, Default)]
struct SeenClock {
    last: Option<DateTime<Utc>>,
}

impl SeenClock {
    fn tick(&mut self, floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let step = Duration::microseconds(1);
        let mut next = Utc::now();
        for previous in [self.last, floor].into_iter().flatten() {
            if next <= previous {
                next = previous + step;
            }
        }
        self.last = Some(next);
        next
    }
}

pub struct SelectionService {
    ledger: RecordLedger,
    store: AssetBlobStore,
    // Held for the whole selection so two callers never pick the same head
    clock: Mutex<SeenClock>,
}

impl SelectionService {
    pub fn new(ledger: RecordLedger, store: AssetBlobStore) -> Self {
        Self {
            ledger,
            store,
            clock: Mutex::new(SeenClock::default()),
        }
    }

    /// Next image to show and its record, or `None` when nothing is cached
    ///
    /// Read failures are logged and reported as an empty cache.
    pub async fn select_unseen(&self) -> Option<(Bytes, CacheRecord)> {
        match self.try_select_unseen().await {
            Ok(selection) => selection,
            Err(e) => {
                error!("Could not select cached image: {}", e);
                None
            }
        }
    }

    async fn try_select_unseen(&self) -> CacheResult<Option<(Bytes, CacheRecord)>> {
        let mut clock = self.clock.lock().await;

        let Some(candidate) = self.ledger.least_recently_seen().await? else {
            debug!("No downloaded images to select from");
            return Ok(None);
        };

        let seen_at = clock.tick(self.ledger.latest_seen().await?);
        let record = self.ledger.mark_seen(&candidate.id, seen_at).await?;

        match self.store.get(&record.id).await {
            Ok(bytes) => {
                debug!("Selected image {} (last seen {})", record.id, candidate.last_seen);
                Ok(Some((bytes, record)))
            }
            Err(e) if e.is_not_found() => {
                error!(
                    "Image {} is marked downloaded but its blob is missing, scheduling re-download",
                    record.id
                );
                self.ledger.mark_missing(&record.id).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`Self::select_unseen`], decoded; undecodable bytes yield `None`
    pub async fn select_unseen_image(&self) -> Option<(DynamicImage, CacheRecord)> {
        let (bytes, record) = self.select_unseen().await?;
        match decode_image(&bytes) {
            Ok(image) => Some((image, record)),
            Err(e) => {
                warn!("Cached image {} could not be decoded: {}", record.id, e);
                None
            }
        }
    }

    /// Next image center-cropped to `width` x `height`
    pub async fn select_unseen_cropped(
        &self,
        width: u32,
        height: u32,
    ) -> Option<(DynamicImage, CacheRecord)> {
        let (image, record) = self.select_unseen_image().await?;
        match crop_to_bounds(&image, width, height) {
            Some(cropped) => Some((cropped, record)),
            None => {
                warn!(
                    "Image {} ({}x{}) is smaller than the requested {}x{}",
                    record.id,
                    image.width(),
                    image.height(),
                    width,
                    height
                );
                None
            }
        }
    }
}

pub fn decode_image(bytes: &[u8]) -> CacheResult<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Center crop; `None` when the requested size is empty or exceeds the image
pub fn crop_to_bounds(image: &DynamicImage, width: u32, height: u32) -> Option<DynamicImage> {
    let (image_width, image_height) = image.dimensions();
    if width == 0 || height == 0 || width > image_width || height > image_height {
        return None;
    }
    let x = (image_width - width) / 2;
    let y = (image_height - height) / 2;
    Some(image.crop_imm(x, y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::errors::CacheError;
    use crate::database::Database;
    use crate::models::{CatalogItem, ImageMeta, LastSeen, PublisherMeta};
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        ledger: RecordLedger,
        store: AssetBlobStore,
        selection: SelectionService,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        };
        let database = Database::connect_and_migrate(&config).await.unwrap();
        let ledger = RecordLedger::new(database.connection());
        let store = AssetBlobStore::new(dir.path().join("images"));
        let selection = SelectionService::new(ledger.clone(), store.clone());
        Fixture {
            _dir: dir,
            ledger,
            store,
            selection,
        }
    }

    impl Fixture {
        async fn add(&self, id: &str, data: &[u8]) {
            let item = CatalogItem {
                image: ImageMeta {
                    id: id.into(),
                    full_image_url: format!("https://images.example.com/{id}"),
                    title: None,
                },
                publisher: PublisherMeta::default(),
            };
            self.ledger
                .upsert(&CacheRecord::from_catalog_item(&item, Utc::now()))
                .await
                .unwrap();
            self.store.put(id, data).await.unwrap();
            self.ledger.mark_downloaded(id).await.unwrap();
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_seen_clock_is_strictly_increasing() {
        let mut clock = SeenClock::default();
        let future = Utc::now() + Duration::hours(1);

        let first = clock.tick(Some(future));
        let second = clock.tick(None);
        let third = clock.tick(Some(first));

        assert!(first > future);
        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_empty_cache_selects_nothing() {
        let fx = fixture().await;
        assert!(fx.selection.select_unseen().await.is_none());
    }

    #[tokio::test]
    async fn test_round_robin_by_recency() {
        let fx = fixture().await;
        for id in ["c", "a", "b"] {
            fx.add(id, id.as_bytes()).await;
        }

        let mut order = Vec::new();
        for _ in 0..6 {
            let (bytes, record) = fx.selection.select_unseen().await.unwrap();
            assert_eq!(bytes.as_ref(), record.id.as_bytes());
            assert!(!record.last_seen.is_never());
            order.push(record.id);
        }

        assert_eq!(order, vec!["a", "b", "c", "a", "b", "c"]);
        assert_eq!(fx.ledger.downloaded_unseen_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_single_record_repeats() {
        let fx = fixture().await;
        fx.add("only", b"data").await;

        let (_, first) = fx.selection.select_unseen().await.unwrap();
        let (_, second) = fx.selection.select_unseen().await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.last_seen > first.last_seen);
    }

    #[tokio::test]
    async fn test_missing_blob_resets_downloaded() {
        let fx = fixture().await;
        fx.add("gone", b"data").await;
        std::fs::remove_file(fx.store.path_for("gone").unwrap()).unwrap();

        assert!(fx.selection.select_unseen().await.is_none());

        let record = fx.ledger.get("gone").await.unwrap();
        assert!(!record.downloaded);
        assert!(matches!(record.last_seen, LastSeen::At(_)));
        assert!(fx.selection.select_unseen().await.is_none());
    }

    #[tokio::test]
    async fn test_select_unseen_image_decodes() {
        let fx = fixture().await;
        fx.add("img", &png(8, 4)).await;

        let (image, record) = fx.selection.select_unseen_image().await.unwrap();
        assert_eq!(record.id, "img");
        assert_eq!(image.dimensions(), (8, 4));
    }

    #[tokio::test]
    async fn test_undecodable_bytes_yield_none_but_count_as_seen() {
        let fx = fixture().await;
        fx.add("junk", b"definitely not an image").await;

        assert!(fx.selection.select_unseen_image().await.is_none());
        assert!(!fx.ledger.get("junk").await.unwrap().last_seen.is_never());
    }

    #[test]
    fn test_decode_image_reports_image_error() {
        assert_eq!(decode_image(&png(3, 2)).unwrap().dimensions(), (3, 2));

        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CacheError::Image { .. }), "got {err}");
        assert!(err.to_string().starts_with("Image error:"));
    }

    #[tokio::test]
    async fn test_select_unseen_cropped() {
        let fx = fixture().await;
        fx.add("img", &png(10, 6)).await;

        let (image, _) = fx.selection.select_unseen_cropped(4, 2).await.unwrap();
        assert_eq!(image.dimensions(), (4, 2));
        assert!(fx.selection.select_unseen_cropped(20, 2).await.is_none());
    }

    #[test]
    fn test_crop_to_bounds_centers() {
        let image = image::load_from_memory(&png(10, 10)).unwrap();

        let cropped = crop_to_bounds(&image, 2, 2).unwrap();
        assert_eq!(cropped.dimensions(), (2, 2));
        // Columns 4 and 5 straddle the red/blue boundary at x = 5
        assert_eq!(cropped.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(cropped.get_pixel(1, 0), Rgba([0, 0, 255, 255]));

        assert!(crop_to_bounds(&image, 11, 2).is_none());
        assert!(crop_to_bounds(&image, 0, 2).is_none());
        assert_eq!(crop_to_bounds(&image, 10, 10).unwrap().dimensions(), (10, 10));
    }
}
