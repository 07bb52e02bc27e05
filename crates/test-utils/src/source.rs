//! In-memory map source that records every render.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbaImage;

use map_cache::{MapRequest, MapSource};
use map_common::{BoundingBox, MapError, MapResult};

use crate::fixtures::reference_time;
use crate::generators::world_gradient;

/// Map source that renders a [`world_gradient`] over a fixed extent and
/// records what it was asked for.
///
/// Every source id shares the same extent, time steps and modification
/// timestamp. Tests can move the timestamp, slow renders down, or make
/// renders covering a given point fail.
pub struct RecordingSource {
    extent: BoundingBox,
    date_times: BTreeSet<DateTime<Utc>>,
    render_delay: Option<Duration>,
    last_modified: Mutex<DateTime<Utc>>,
    fail_at: Mutex<Option<(f64, f64)>>,
    requests: Mutex<Vec<MapRequest>>,
    renders: AtomicUsize,
    extent_calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingSource {
    pub fn new(extent: BoundingBox) -> Self {
        Self {
            extent,
            date_times: BTreeSet::new(),
            render_delay: None,
            last_modified: Mutex::new(reference_time()),
            fail_at: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            renders: AtomicUsize::new(0),
            extent_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_date_times(mut self, times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        self.date_times = times.into_iter().collect();
        self
    }

    /// Sleep this long inside every render.
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = Some(delay);
        self
    }

    pub fn set_last_modified(&self, modified: DateTime<Utc>) {
        *lock(&self.last_modified) = modified;
    }

    /// Fail every render whose bbox contains `(x, y)`.
    pub fn fail_at(&self, x: f64, y: f64) {
        *lock(&self.fail_at) = Some((x, y));
    }

    pub fn clear_failure(&self) {
        *lock(&self.fail_at) = None;
    }

    /// Number of successful renders so far.
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    /// Number of extent lookups so far.
    pub fn extent_calls(&self) -> usize {
        self.extent_calls.load(Ordering::SeqCst)
    }

    /// Highest number of renders observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Every render request received, in arrival order.
    pub fn requests(&self) -> Vec<MapRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl MapSource for RecordingSource {
    async fn get_map(&self, request: &MapRequest) -> MapResult<RgbaImage> {
        lock(&self.requests).push(request.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.render_delay {
            tokio::time::sleep(delay).await;
        }

        let failing = *lock(&self.fail_at);
        let result = match failing {
            Some((x, y)) if request.bbox.contains_point(x, y) => Err(MapError::source(format!(
                "simulated render failure at ({}, {})",
                x, y
            ))),
            _ => {
                self.renders.fetch_add(1, Ordering::SeqCst);
                Ok(world_gradient(&self.extent, &request.bbox, request.width, request.height))
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_date_times(&self, _source_id: &str) -> MapResult<BTreeSet<DateTime<Utc>>> {
        Ok(self.date_times.clone())
    }

    async fn last_modified(&self, _source_id: &str) -> MapResult<DateTime<Utc>> {
        Ok(*lock(&self.last_modified))
    }

    async fn extent(&self, _source_id: &str) -> MapResult<BoundingBox> {
        self.extent_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.extent)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::bbox::SQUARE_1000;

    #[test]
    fn test_records_renders() {
        let source = RecordingSource::new(SQUARE_1000);
        let request = MapRequest::new("src", reference_time(), SQUARE_1000, 8, 8);

        let image = tokio_test::block_on(source.get_map(&request)).unwrap();
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(source.render_count(), 1);
        assert_eq!(source.requests(), vec![request]);
    }

    #[test]
    fn test_failure_point() {
        let source = RecordingSource::new(SQUARE_1000);
        source.fail_at(100.0, 100.0);

        let hit = MapRequest::new("src", reference_time(), BoundingBox::new(0.0, 0.0, 500.0, 500.0), 4, 4);
        let miss = MapRequest::new("src", reference_time(), BoundingBox::new(500.0, 500.0, 1000.0, 1000.0), 4, 4);

        assert!(tokio_test::block_on(source.get_map(&hit)).is_err());
        assert!(tokio_test::block_on(source.get_map(&miss)).is_ok());
        assert_eq!(source.render_count(), 1);

        source.clear_failure();
        assert!(tokio_test::block_on(source.get_map(&hit)).is_ok());
    }
}
