//! Error types for the map tile cache.

use thiserror::Error;

use crate::bbox::BboxParseError;
use crate::crs::CrsParseError;
use crate::time::TimeParseError;

/// Result type alias using MapError.
pub type MapResult<T> = Result<T, MapError>;

/// Primary error type for tiled map operations.
#[derive(Debug, Error)]
pub enum MapError {
    // === Request Errors ===
    #[error("Unsupported CRS for cached maps: {0}")]
    UnsupportedCrs(String),

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    // === Tiling Errors ===
    #[error("Invalid number of zoom levels: {0} (must be at least 1)")]
    InvalidZoomLevels(u32),

    #[error("Cannot stitch an empty set of tiles")]
    EmptyStitch,

    #[error("Tile images differ in size: expected {expected:?}, found {found:?}")]
    MismatchedTileSizes {
        expected: (u32, u32),
        found: (u32, u32),
    },

    // === Source Errors ===
    #[error("Tile render failed for {key}: {message}")]
    TileRenderFailed { key: String, message: String },

    #[error("Map source error: {0}")]
    SourceError(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MapError {
    /// True when the caller sent a request that can never succeed as-is.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MapError::UnsupportedCrs(_)
                | MapError::InvalidBbox(_)
                | MapError::InvalidParameter { .. }
                | MapError::InvalidTime(_)
        )
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a SourceError.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::SourceError(msg.into())
    }
}

impl From<BboxParseError> for MapError {
    fn from(err: BboxParseError) -> Self {
        MapError::InvalidBbox(err.to_string())
    }
}

impl From<CrsParseError> for MapError {
    fn from(err: CrsParseError) -> Self {
        match err {
            CrsParseError::UnsupportedCrs(crs) => MapError::UnsupportedCrs(crs),
        }
    }
}

impl From<TimeParseError> for MapError {
    fn from(err: TimeParseError) -> Self {
        MapError::InvalidTime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(MapError::UnsupportedCrs("EPSG:4326".into()).is_client_error());
        assert!(MapError::invalid_parameter("width", "must be > 0").is_client_error());
        assert!(!MapError::EmptyStitch.is_client_error());
        assert!(!MapError::TileRenderFailed {
            key: "k".into(),
            message: "boom".into()
        }
        .is_client_error());
    }

    #[test]
    fn test_crs_parse_error_maps_to_unsupported_crs() {
        let err: MapError = CrsParseError::UnsupportedCrs("EPSG:1".into()).into();
        assert!(matches!(err, MapError::UnsupportedCrs(ref c) if c == "EPSG:1"));
    }
}
