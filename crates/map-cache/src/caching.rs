//! Tiled, cached wrapper around a per-tile map source.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::RgbaImage;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use compositor::{blank_map, compose_map, stitch, union_bbox, TileImage};
use map_common::{BoundingBox, MapError, MapResult, Tile, TimeRange};
use tile_cache::{ModificationCheck, SourceModificationTracker, TileCache, TileCacheKey, TileCacheStats};

use crate::zoom::{self, ZoomLevelIndex};
use crate::{MapCacheConfig, MapRequest, MapSource, MapsRequest};

/// Serves arbitrary map requests from cached zoom-level tiles.
///
/// Each request is answered by picking the zoom level that best matches the
/// requested extent, resolving the intersecting tiles from the cache (the
/// wrapped source renders missing ones concurrently), stitching them and
/// cropping the mosaic to the requested bbox and size.
///
/// Only [`CrsCode::CACHEABLE`](map_common::CrsCode::CACHEABLE) requests are
/// supported. Tiles of a source are evicted as soon as its last-modified
/// timestamp changes.
pub struct CachingMapSource<S> {
    inner: Arc<S>,
    config: MapCacheConfig,
    cache: Arc<TileCache<TileImage>>,
    tracker: SourceModificationTracker,
    indexes: RwLock<HashMap<String, Arc<ZoomLevelIndex>>>,
}

impl<S: MapSource> CachingMapSource<S> {
    /// Wrap `inner` with a cache of its own.
    pub fn new(inner: S, config: MapCacheConfig) -> MapResult<Self> {
        let cache = Arc::new(TileCache::new(config.cache_expiration()));
        Self::with_cache(Arc::new(inner), config, cache)
    }

    /// Wrap `inner` using a tile cache shared with other instances.
    pub fn with_cache(
        inner: Arc<S>,
        config: MapCacheConfig,
        cache: Arc<TileCache<TileImage>>,
    ) -> MapResult<Self> {
        zoom::validate_level_count(config.number_of_cached_zoom_levels)?;
        config
            .validate()
            .map_err(|e| MapError::invalid_parameter("config", e))?;

        info!(
            image_width = config.cached_image_width,
            zoom_levels = config.number_of_cached_zoom_levels,
            expiration_minutes = config.cache_expiration_minutes,
            "Caching map source initialized"
        );

        Ok(Self {
            inner,
            config,
            cache,
            tracker: SourceModificationTracker::new(),
            indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    pub fn config(&self) -> &MapCacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TileCache<TileImage>> {
        &self.cache
    }

    pub fn stats(&self) -> TileCacheStats {
        self.cache.stats()
    }

    /// Zoom index for `source_id`, built from the source's extent on first use.
    pub async fn zoom_index(&self, source_id: &str) -> MapResult<Arc<ZoomLevelIndex>> {
        if let Some(index) = self.indexes.read().await.get(source_id) {
            return Ok(index.clone());
        }

        let extent = self.inner.extent(source_id).await?;
        let index = Arc::new(ZoomLevelIndex::new(
            extent,
            self.config.number_of_cached_zoom_levels,
        )?);

        let mut indexes = self.indexes.write().await;
        let index = indexes
            .entry(source_id.to_string())
            .or_insert_with(|| {
                info!(
                    source_id = source_id,
                    extent = %extent,
                    levels = index.levels(),
                    "Built zoom level index"
                );
                index
            })
            .clone();
        Ok(index)
    }

    /// Render one map for `request` from cached tiles.
    #[instrument(skip(self, request), fields(source_id = %request.source_id, bbox = %request.bbox))]
    pub async fn get_cached_map(&self, request: &MapRequest) -> MapResult<RgbaImage> {
        if !request.crs.is_cacheable() {
            return Err(MapError::UnsupportedCrs(request.crs.to_string()));
        }
        request.validate()?;

        let modified = self.inner.last_modified(&request.source_id).await?;
        if let ModificationCheck::Invalidated { evicted } = self
            .tracker
            .check_and_invalidate(&request.source_id, modified, &self.cache)
            .await
        {
            debug!(evicted = evicted, "Dropped stale tiles before serving request");
        }

        let index = self.zoom_index(&request.source_id).await?;
        let (level, tiles) = index.intersecting_tiles(&request.bbox);

        if tiles.is_empty() {
            debug!(level = level, "Request outside source extent, returning blank map");
            return Ok(blank_map(request.width, request.height));
        }

        let limit = self
            .config
            .max_concurrent_tile_renders
            .unwrap_or(tiles.len())
            .max(1);

        debug!(level = level, tiles = tiles.len(), limit = limit, "Fetching tiles");

        let images: Vec<Arc<TileImage>> = stream::iter(tiles)
            .map(|tile| self.fetch_tile(request, level, tile))
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        let requested = request.bbox;
        let (width, height) = (request.width, request.height);

        tokio::task::spawn_blocking(move || {
            let mosaic = stitch(&images)?;
            let extent = union_bbox(&images).ok_or(MapError::EmptyStitch)?;
            compose_map(&mosaic, &extent, &requested, width, height)
        })
        .await
        .map_err(|e| MapError::Internal(format!("compose task failed: {}", e)))?
    }

    /// Render `request.bbox` once per time step, each from its own source.
    ///
    /// Steps run concurrently; the first failure fails the whole call.
    pub async fn get_maps(
        &self,
        request: &MapsRequest,
    ) -> MapResult<BTreeMap<DateTime<Utc>, RgbaImage>> {
        let steps = request.time_steps.iter().map(|(date_time, source_id)| {
            let step = request.request_for(*date_time, source_id);
            async move {
                let image = self.get_cached_map(&step).await?;
                Ok::<_, MapError>((step.date_time, image))
            }
        });

        let maps = try_join_all(steps).await?;
        Ok(maps.into_iter().collect())
    }

    async fn fetch_tile(
        &self,
        request: &MapRequest,
        level: u32,
        tile: Tile,
    ) -> MapResult<Arc<TileImage>> {
        let key = TileCacheKey::new(
            request.source_id.as_str(),
            request.item.as_deref(),
            request.date_time,
            level,
            &tile,
        );

        self.cache
            .get_or_render(&key, || self.render_tile(request, tile))
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Tile render failed");
                MapError::TileRenderFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            })
    }

    async fn render_tile(&self, request: &MapRequest, tile: Tile) -> MapResult<TileImage> {
        let width = self.config.cached_image_width;
        let height = tile.pixel_height_for(width);

        let image = self
            .inner
            .get_map(&request.for_tile(tile.bbox, width, height))
            .await?;

        if image.dimensions() != (width, height) {
            return Err(MapError::source(format!(
                "tile rendered at {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                width,
                height
            )));
        }

        Ok(TileImage::new(tile, image))
    }
}

#[async_trait]
impl<S: MapSource> MapSource for CachingMapSource<S> {
    async fn get_map(&self, request: &MapRequest) -> MapResult<RgbaImage> {
        self.get_cached_map(request).await
    }

    async fn get_date_times(&self, source_id: &str) -> MapResult<BTreeSet<DateTime<Utc>>> {
        self.inner.get_date_times(source_id).await
    }

    async fn get_date_times_in(
        &self,
        source_id: &str,
        range: &TimeRange,
    ) -> MapResult<BTreeSet<DateTime<Utc>>> {
        self.inner.get_date_times_in(source_id, range).await
    }

    async fn last_modified(&self, source_id: &str) -> MapResult<DateTime<Utc>> {
        self.inner.last_modified(source_id).await
    }

    async fn extent(&self, source_id: &str) -> MapResult<BoundingBox> {
        self.inner.extent(source_id).await
    }
}
