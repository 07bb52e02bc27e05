//! Map request types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use map_common::{BoundingBox, CrsCode, MapError, MapResult};

/// A request for one map bitmap.
///
/// `style` and `parameters` are opaque here and only forwarded to the
/// wrapped source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRequest {
    pub source_id: String,
    pub date_time: DateTime<Utc>,
    pub item: Option<String>,
    pub style: String,
    pub crs: CrsCode,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl MapRequest {
    /// Request in the cacheable CRS with default style and no item.
    pub fn new(
        source_id: impl Into<String>,
        date_time: DateTime<Utc>,
        bbox: BoundingBox,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            date_time,
            item: None,
            style: String::new(),
            crs: CrsCode::CACHEABLE,
            bbox,
            width,
            height,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_crs(mut self, crs: CrsCode) -> Self {
        self.crs = crs;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Same request narrowed to one tile extent and pixel size.
    pub fn for_tile(&self, bbox: BoundingBox, width: u32, height: u32) -> Self {
        Self {
            bbox,
            width,
            height,
            ..self.clone()
        }
    }

    /// Reject requests that can never produce a bitmap.
    pub fn validate(&self) -> MapResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MapError::invalid_parameter(
                "size",
                format!("width and height must be > 0, got {}x{}", self.width, self.height),
            ));
        }
        if !self.bbox.is_valid() {
            return Err(MapError::InvalidBbox(self.bbox.to_string()));
        }
        Ok(())
    }
}

/// One bbox and size rendered at several time steps.
///
/// Each time step names the source holding data for that instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapsRequest {
    pub style: String,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub time_steps: BTreeMap<DateTime<Utc>, String>,
    pub item: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl MapsRequest {
    /// Per-step map request in the cacheable CRS.
    pub fn request_for(&self, date_time: DateTime<Utc>, source_id: &str) -> MapRequest {
        MapRequest {
            source_id: source_id.to_string(),
            date_time,
            item: self.item.clone(),
            style: self.style.clone(),
            crs: CrsCode::CACHEABLE,
            bbox: self.bbox,
            width: self.width,
            height: self.height,
            parameters: self.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_for_tile_keeps_everything_but_geometry() {
        let request = MapRequest::new("src", at(0), BoundingBox::new(0.0, 0.0, 10.0, 10.0), 64, 64)
            .with_item("TMP")
            .with_style("temperature")
            .with_parameter("elevation", "2m");

        let tile = request.for_tile(BoundingBox::new(0.0, 0.0, 5.0, 5.0), 256, 256);
        assert_eq!(tile.bbox, BoundingBox::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!((tile.width, tile.height), (256, 256));
        assert_eq!(tile.item.as_deref(), Some("TMP"));
        assert_eq!(tile.style, "temperature");
        assert_eq!(tile.parameters.get("elevation").map(String::as_str), Some("2m"));
    }

    #[test]
    fn test_validate() {
        let ok = MapRequest::new("src", at(0), BoundingBox::new(0.0, 0.0, 10.0, 10.0), 1, 1);
        assert!(ok.validate().is_ok());

        let zero = MapRequest { width: 0, ..ok.clone() };
        assert!(matches!(zero.validate(), Err(MapError::InvalidParameter { .. })));

        let flat = MapRequest {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 0.0),
            ..ok
        };
        assert!(matches!(flat.validate(), Err(MapError::InvalidBbox(_))));
    }

    #[test]
    fn test_maps_request_forces_cacheable_crs() {
        let maps = MapsRequest {
            style: "wind".into(),
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            width: 32,
            height: 16,
            time_steps: BTreeMap::from([(at(0), "a".to_string()), (at(6), "b".to_string())]),
            item: None,
            parameters: BTreeMap::new(),
        };

        let step = maps.request_for(at(6), "b");
        assert_eq!(step.crs, CrsCode::CACHEABLE);
        assert_eq!(step.source_id, "b");
        assert_eq!(step.date_time, at(6));
        assert_eq!((step.width, step.height), (32, 16));
    }
}
