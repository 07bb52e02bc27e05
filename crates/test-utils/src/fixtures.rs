//! Common test fixtures for map cache tests.
//!
//! Extents and timestamps shared by tests across crates, so scenarios read
//! the same everywhere.

use chrono::{DateTime, TimeZone, Utc};
use map_common::BoundingBox;

/// Common bounding box definitions for testing.
pub mod bbox {
    use super::BoundingBox;

    /// Round-numbered square extent; level `L` tiles are `1000 / 2^L` wide.
    pub const SQUARE_1000: BoundingBox = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 1000.0,
        max_y: 1000.0,
    };

    /// Wider than tall, to exercise non-square tile pixel heights.
    pub const WIDE_2000X1000: BoundingBox = BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 2000.0,
        max_y: 1000.0,
    };
}

/// Source ids used in tests.
pub mod sources {
    pub const GFS: &str = "gfs_2024030100.nc";
    pub const HRRR: &str = "hrrr_2024030106.nc";
}

/// Model run time used as the default timestamp in tests (2024-03-01 00:00Z).
pub fn reference_time() -> DateTime<Utc> {
    hours_after_reference(0)
}

/// `hours` after [`reference_time`].
pub fn hours_after_reference(hours: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::hours(hours as i64)
}
