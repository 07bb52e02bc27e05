//! Per-tile map sources.
//!
//! - [`GradientSource`]: synthetic colour ramp, useful for smoke tests
//! - [`ImageFileSource`]: a georeferenced PNG on disk, re-read when the file
//!   changes

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use image::{Rgba, RgbaImage};
use tokio::sync::RwLock;
use tracing::{debug, info};

use compositor::compose_map;
use map_cache::{MapRequest, MapSource};
use map_common::{BoundingBox, MapError, MapResult};

/// Renders a west-to-east red ramp and south-to-north green ramp over a
/// fixed extent, for a run of hourly time steps.
pub struct GradientSource {
    extent: BoundingBox,
    start: DateTime<Utc>,
    steps: u32,
}

impl GradientSource {
    pub fn new(extent: BoundingBox, start: DateTime<Utc>, steps: u32) -> Self {
        Self {
            extent,
            start,
            steps,
        }
    }

    fn color_at(&self, x: f64, y: f64, date_time: DateTime<Utc>) -> Rgba<u8> {
        let fx = ((x - self.extent.min_x) / self.extent.width()).clamp(0.0, 1.0);
        let fy = ((y - self.extent.min_y) / self.extent.height()).clamp(0.0, 1.0);
        // Blue cycles with the hour so consecutive steps differ
        let hours = (date_time - self.start).num_hours().rem_euclid(24) as f64;
        Rgba([
            (fx * 255.0).round() as u8,
            (fy * 255.0).round() as u8,
            (hours / 23.0 * 255.0).round() as u8,
            255,
        ])
    }
}

#[async_trait]
impl MapSource for GradientSource {
    async fn get_map(&self, request: &MapRequest) -> MapResult<RgbaImage> {
        let bbox = request.bbox;
        let px_w = bbox.width() / request.width as f64;
        let px_h = bbox.height() / request.height as f64;

        Ok(RgbaImage::from_fn(request.width, request.height, |px, py| {
            let x = bbox.min_x + (px as f64 + 0.5) * px_w;
            let y = bbox.max_y - (py as f64 + 0.5) * px_h;
            self.color_at(x, y, request.date_time)
        }))
    }

    async fn get_date_times(&self, _source_id: &str) -> MapResult<BTreeSet<DateTime<Utc>>> {
        Ok((0..self.steps)
            .map(|h| self.start + Duration::hours(h as i64))
            .collect())
    }

    async fn last_modified(&self, _source_id: &str) -> MapResult<DateTime<Utc>> {
        Ok(self.start)
    }

    async fn extent(&self, _source_id: &str) -> MapResult<BoundingBox> {
        Ok(self.extent)
    }
}

struct LoadedImage {
    modified: SystemTime,
    image: Arc<RgbaImage>,
}

/// A PNG covering a known extent, served for a single valid time.
///
/// The file's modification time is reported as the source's last-modified
/// timestamp, so replacing the file evicts its cached tiles. The decoded
/// bitmap is kept in memory and reloaded when the timestamp moves.
pub struct ImageFileSource {
    path: PathBuf,
    extent: BoundingBox,
    valid_time: DateTime<Utc>,
    loaded: RwLock<Option<LoadedImage>>,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>, extent: BoundingBox, valid_time: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            extent,
            valid_time,
            loaded: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn modified(&self) -> MapResult<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|e| MapError::source(format!("{}: {}", self.path.display(), e)))
    }

    async fn image(&self) -> MapResult<Arc<RgbaImage>> {
        let modified = self.modified().await?;

        if let Some(loaded) = self.loaded.read().await.as_ref() {
            if loaded.modified == modified {
                return Ok(loaded.image.clone());
            }
        }

        let mut loaded = self.loaded.write().await;
        if let Some(current) = loaded.as_ref() {
            if current.modified == modified {
                return Ok(current.image.clone());
            }
        }

        let path = self.path.clone();
        let image = tokio::task::spawn_blocking(move || image::open(&path).map(|img| img.to_rgba8()))
            .await
            .map_err(|e| MapError::Internal(format!("image load task failed: {}", e)))?
            .map_err(|e| MapError::source(format!("{}: {}", self.path.display(), e)))?;

        info!(
            path = %self.path.display(),
            width = image.width(),
            height = image.height(),
            "Loaded source image"
        );

        let image = Arc::new(image);
        *loaded = Some(LoadedImage {
            modified,
            image: image.clone(),
        });
        Ok(image)
    }
}

#[async_trait]
impl MapSource for ImageFileSource {
    async fn get_map(&self, request: &MapRequest) -> MapResult<RgbaImage> {
        let image = self.image().await?;
        let extent = self.extent;
        let (bbox, width, height) = (request.bbox, request.width, request.height);

        debug!(bbox = %bbox, width = width, height = height, "Rendering from source image");

        tokio::task::spawn_blocking(move || compose_map(&image, &extent, &bbox, width, height))
            .await
            .map_err(|e| MapError::Internal(format!("render task failed: {}", e)))?
    }

    async fn get_date_times(&self, _source_id: &str) -> MapResult<BTreeSet<DateTime<Utc>>> {
        Ok(BTreeSet::from([self.valid_time]))
    }

    async fn last_modified(&self, _source_id: &str) -> MapResult<DateTime<Utc>> {
        Ok(DateTime::<Utc>::from(self.modified().await?))
    }

    async fn extent(&self, _source_id: &str) -> MapResult<BoundingBox> {
        Ok(self.extent)
    }
}
