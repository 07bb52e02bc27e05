//! Configuration for the caching map source.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::zoom::MAX_ZOOM_LEVELS;

/// Configuration for [`CachingMapSource`](crate::CachingMapSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapCacheConfig {
    /// Pixel width every cached tile is rendered at. Height follows the
    /// tile's aspect ratio.
    pub cached_image_width: u32,

    /// Number of precomputed zoom levels (level 0 is the whole extent),
    /// at most [`MAX_ZOOM_LEVELS`].
    pub number_of_cached_zoom_levels: u32,

    /// Sliding expiration window for cached tiles, in minutes.
    pub cache_expiration_minutes: u64,

    /// Upper bound on concurrent tile renders per request. `None` renders
    /// every tile of a request at once.
    pub max_concurrent_tile_renders: Option<usize>,
}

impl Default for MapCacheConfig {
    fn default() -> Self {
        Self {
            cached_image_width: 1024,
            number_of_cached_zoom_levels: 5,
            cache_expiration_minutes: 20,
            max_concurrent_tile_renders: None,
        }
    }
}

impl MapCacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MAP_CACHE_IMAGE_WIDTH") {
            if let Ok(width) = val.parse() {
                config.cached_image_width = width;
            }
        }

        if let Ok(val) = std::env::var("MAP_CACHE_ZOOM_LEVELS") {
            if let Ok(levels) = val.parse() {
                config.number_of_cached_zoom_levels = levels;
            }
        }

        if let Ok(val) = std::env::var("MAP_CACHE_EXPIRATION_MINUTES") {
            if let Ok(minutes) = val.parse() {
                config.cache_expiration_minutes = minutes;
            }
        }

        if let Ok(val) = std::env::var("MAP_CACHE_MAX_CONCURRENT_RENDERS") {
            if let Ok(limit) = val.parse() {
                config.max_concurrent_tile_renders = Some(limit);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cached_image_width == 0 {
            return Err("cached_image_width must be > 0".to_string());
        }

        if self.number_of_cached_zoom_levels == 0 {
            return Err("number_of_cached_zoom_levels must be > 0".to_string());
        }

        if self.number_of_cached_zoom_levels > MAX_ZOOM_LEVELS {
            return Err(format!(
                "number_of_cached_zoom_levels must be <= {}, got {}",
                MAX_ZOOM_LEVELS, self.number_of_cached_zoom_levels
            ));
        }

        if self.cache_expiration_minutes == 0 {
            return Err("cache_expiration_minutes must be > 0".to_string());
        }

        if self.max_concurrent_tile_renders == Some(0) {
            return Err("max_concurrent_tile_renders must be > 0 when set".to_string());
        }

        Ok(())
    }

    /// Sliding expiration window as a duration.
    pub fn cache_expiration(&self) -> Duration {
        Duration::from_secs(self.cache_expiration_minutes * 60)
    }
}
