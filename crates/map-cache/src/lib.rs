//! Tiled caching layer for map sources.
//!
//! Wraps a per-tile [`MapSource`] so that arbitrary map requests are served
//! from cached zoom-level tiles instead of full renders.
//!
//! # Architecture
//!
//! ```text
//! get_map(request)
//!      │
//!      ├─► reject non-cacheable CRS
//!      │
//!      ├─► SourceModificationTracker: evict source tiles if data changed
//!      │
//!      ├─► ZoomLevelIndex: pick level, list intersecting tiles
//!      │
//!      ├─► TileCache::get_or_render per tile (concurrent)
//!      │         │
//!      │         ├─► hit: shared cached image
//!      │         └─► miss: inner.get_map(tile bbox) and store
//!      │
//!      └─► stitch ─► compose_map (crop + resample) ─► output bitmap
//! ```

pub mod caching;
pub mod config;
pub mod request;
pub mod source;
pub mod zoom;

pub use caching::CachingMapSource;
pub use config::MapCacheConfig;
pub use request::{MapRequest, MapsRequest};
pub use source::MapSource;
pub use zoom::{ZoomLevelIndex, MAX_ZOOM_LEVELS};

// Re-export the types callers need alongside the orchestrator
pub use compositor::TileImage;
pub use map_common::{BoundingBox, CrsCode, MapError, MapResult, Tile, TimeRange};
pub use tile_cache::{TileCache, TileCacheStats};
