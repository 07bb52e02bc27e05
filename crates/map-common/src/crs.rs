//! Coordinate Reference System codes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BoundingBox;

/// Well-known CRS codes understood by the map sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lat/lon in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// The only projected system whose tiles may be cached.
    ///
    /// Tiles are planar squares of a regular grid, which only holds for a
    /// projected CRS with square pixels.
    pub const CACHEABLE: CrsCode = CrsCode::Epsg3857;

    /// Parse a CRS string (supports both SRS and CRS parameter formats).
    ///
    /// Accepts formats like:
    /// - "EPSG:3857" / "epsg:3857"
    /// - "EPSG:900913" (legacy Google Mercator alias)
    /// - "EPSG:4326" / "CRS:84"
    pub fn from_wms_string(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Whether tiles rendered in this CRS may be cached.
    pub fn is_cacheable(&self) -> bool {
        *self == Self::CACHEABLE
    }

    /// Get the valid bounds for this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self {
            CrsCode::Epsg4326 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => {
                // Web Mercator bounds (approx ±85.06° latitude)
                let max_extent = 20037508.342789244;
                BoundingBox::new(-max_extent, -max_extent, max_extent, max_extent)
            }
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
