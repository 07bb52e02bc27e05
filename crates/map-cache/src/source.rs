//! The map source contract.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbaImage;

use map_common::{BoundingBox, MapResult, TimeRange};

use crate::MapRequest;

/// Something that can render map bitmaps for a source of gridded data.
///
/// Implemented by concrete renderers and by
/// [`CachingMapSource`](crate::CachingMapSource), so a cached source can be
/// used wherever an uncached one is expected.
#[async_trait]
pub trait MapSource: Send + Sync {
    /// Render `request.bbox` at exactly `request.width × request.height`.
    async fn get_map(&self, request: &MapRequest) -> MapResult<RgbaImage>;

    /// Every time step with data for `source_id`.
    async fn get_date_times(&self, source_id: &str) -> MapResult<BTreeSet<DateTime<Utc>>>;

    /// Time steps of `source_id` that fall inside `range` (inclusive).
    async fn get_date_times_in(
        &self,
        source_id: &str,
        range: &TimeRange,
    ) -> MapResult<BTreeSet<DateTime<Utc>>> {
        let all = self.get_date_times(source_id).await?;
        Ok(range.filter(&all))
    }

    /// When the data behind `source_id` last changed.
    async fn last_modified(&self, source_id: &str) -> MapResult<DateTime<Utc>>;

    /// Full extent of `source_id` in the cacheable CRS.
    async fn extent(&self, source_id: &str) -> MapResult<BoundingBox>;
}
