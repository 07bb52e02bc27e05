//! Last-modified tracking that invalidates a source's tiles when its data changes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::memory::TileCache;

/// Outcome of a [`SourceModificationTracker::check_and_invalidate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationCheck {
    /// First time this source was seen; its timestamp is now recorded.
    FirstSeen,
    /// Timestamp matches the recorded one.
    Unchanged,
    /// Timestamp changed; `evicted` cached tiles were removed.
    Invalidated { evicted: usize },
}

/// Per-source last-modified timestamps.
#[derive(Default)]
pub struct SourceModificationTracker {
    last_modified: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl SourceModificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `current` against the recorded timestamp for `source_id`.
    ///
    /// When they differ, every tile of the source is evicted from `cache`
    /// before the new timestamp is recorded. The tracker's write lock is held
    /// across the eviction, so concurrent requests for a changed source wait
    /// until stale tiles are gone. Renders of the source that were already
    /// running keep their result out of the cache.
    pub async fn check_and_invalidate<V>(
        &self,
        source_id: &str,
        current: DateTime<Utc>,
        cache: &TileCache<V>,
    ) -> ModificationCheck
    where
        V: Send + Sync,
    {
        {
            let last_modified = self.last_modified.read().await;
            if last_modified.get(source_id) == Some(&current) {
                return ModificationCheck::Unchanged;
            }
        }

        let mut last_modified = self.last_modified.write().await;
        match last_modified.get(source_id).copied() {
            None => {
                last_modified.insert(source_id.to_string(), current);
                debug!(source_id = source_id, modified = %current, "Tracking new source");
                ModificationCheck::FirstSeen
            }
            Some(previous) if previous == current => ModificationCheck::Unchanged,
            Some(previous) => {
                let evicted = cache.invalidate_source(source_id).await;
                last_modified.insert(source_id.to_string(), current);
                info!(
                    source_id = source_id,
                    previous = %previous,
                    modified = %current,
                    evicted = evicted,
                    "Source data changed"
                );
                ModificationCheck::Invalidated { evicted }
            }
        }
    }

    /// Recorded timestamp for `source_id`, if any.
    pub async fn last_modified(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.last_modified.read().await.get(source_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileCacheKey;
    use chrono::TimeZone;
    use map_common::{BoundingBox, Tile};
    use std::sync::Arc;
    use std::time::Duration;

    fn key(source: &str) -> TileCacheKey {
        let tile = Tile::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0, 0);
        let when = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TileCacheKey::new(source, None, when, 0, &tile)
    }

    fn mtime(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_first_seen_does_not_evict() {
        let cache: TileCache<u8> = TileCache::new(Duration::from_secs(60));
        cache.insert(key("a"), Arc::new(1)).await;
        let tracker = SourceModificationTracker::new();

        let check = tracker.check_and_invalidate("a", mtime(0), &cache).await;

        assert_eq!(check, ModificationCheck::FirstSeen);
        assert_eq!(cache.len(), 1);
        assert_eq!(tracker.last_modified("a").await, Some(mtime(0)));
    }

    #[tokio::test]
    async fn test_unchanged_is_noop() {
        let cache: TileCache<u8> = TileCache::new(Duration::from_secs(60));
        let tracker = SourceModificationTracker::new();
        tracker.check_and_invalidate("a", mtime(0), &cache).await;
        cache.insert(key("a"), Arc::new(1)).await;

        let check = tracker.check_and_invalidate("a", mtime(0), &cache).await;

        assert_eq!(check, ModificationCheck::Unchanged);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_timestamp_evicts_only_that_source() {
        let cache: TileCache<u8> = TileCache::new(Duration::from_secs(60));
        let tracker = SourceModificationTracker::new();
        tracker.check_and_invalidate("a", mtime(0), &cache).await;
        tracker.check_and_invalidate("b", mtime(0), &cache).await;
        cache.insert(key("a"), Arc::new(1)).await;
        cache.insert(key("b"), Arc::new(2)).await;

        let check = tracker.check_and_invalidate("a", mtime(5), &cache).await;

        assert_eq!(check, ModificationCheck::Invalidated { evicted: 1 });
        assert!(cache.get(&key("a")).await.is_none());
        assert!(cache.get(&key("b")).await.is_some());
        assert_eq!(tracker.last_modified("a").await, Some(mtime(5)));
    }

    #[tokio::test]
    async fn test_older_timestamp_also_counts_as_change() {
        let cache: TileCache<u8> = TileCache::new(Duration::from_secs(60));
        let tracker = SourceModificationTracker::new();
        tracker.check_and_invalidate("a", mtime(10), &cache).await;
        cache.insert(key("a"), Arc::new(1)).await;

        let check = tracker.check_and_invalidate("a", mtime(3), &cache).await;
        assert_eq!(check, ModificationCheck::Invalidated { evicted: 1 });
    }

    #[tokio::test]
    async fn test_render_started_before_change_is_not_cached() {
        let cache: TileCache<u8> = TileCache::new(Duration::from_secs(60));
        let tracker = SourceModificationTracker::new();
        tracker.check_and_invalidate("a", mtime(0), &cache).await;

        let k = key("a");
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut stale = Box::pin(cache.get_or_render(&k, || async move {
            rx.await.map_err(|_| "sender dropped")?;
            Ok::<_, &str>(1)
        }));
        assert!(futures::poll!(stale.as_mut()).is_pending());

        let check = tracker.check_and_invalidate("a", mtime(5), &cache).await;
        assert_eq!(check, ModificationCheck::Invalidated { evicted: 0 });

        tx.send(()).unwrap();
        assert_eq!(*stale.await.unwrap(), 1);
        assert!(cache.get(&k).await.is_none());
    }
}
