//! In-memory sliding-expiration cache for rendered tiles.
//!
//! ## Expiration
//!
//! Every read of an entry resets its countdown. Entries idle for longer than
//! the configured window are dropped lazily on the next read, or eagerly by
//! [`TileCache::purge_expired`].
//!
//! ## Single-flight rendering
//!
//! [`TileCache::get_or_render`] serialises misses per key: concurrent callers
//! asking for the same missing tile wait on one render, while misses on
//! different keys never share a lock.
//!
//! ## Invalidation during a render
//!
//! Each source carries a generation number that [`TileCache::invalidate_source`]
//! and [`TileCache::clear`] advance. A render only stores its tile if the
//! generation it started under is still current, so a tile rendered from
//! data that changed mid-render is returned to its caller but never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, RwLock};
use tracing::{debug, info};

use crate::key::TileCacheKey;

type GateRegistry = Mutex<HashMap<TileCacheKey, Weak<AsyncMutex<()>>>>;

/// Sliding-expiration cache of rendered tiles, generic over the tile value.
///
/// Design considerations:
/// - RwLock over the entry map; hits only take the shared lock
/// - Last-access stamps are atomics so a hit can refresh expiry without
///   exclusive access
/// - In-flight renders are tracked per key for single-flight misses
pub struct TileCache<V> {
    store: RwLock<Store<V>>,
    in_flight: GateRegistry,
    expiration: Duration,
    epoch: Instant,
    stats: Counters,
}

struct Store<V> {
    entries: HashMap<TileCacheKey, CachedTile<V>>,
    /// Advanced per source on invalidation; absent means zero.
    generations: HashMap<String, u64>,
    /// Advanced on every `clear`.
    clears: u64,
}

impl<V> Store<V> {
    fn stamp(&self, source_id: &str) -> Stamp {
        Stamp {
            clears: self.clears,
            generation: self.generations.get(source_id).copied().unwrap_or(0),
        }
    }
}

/// Snapshot of the invalidation state a render started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    clears: u64,
    generation: u64,
}

struct CachedTile<V> {
    value: Arc<V>,
    /// Nanoseconds since the cache epoch at the last access.
    last_access: AtomicU64,
}

impl<V> CachedTile<V> {
    fn new(value: Arc<V>, now: u64) -> Self {
        Self {
            value,
            last_access: AtomicU64::new(now),
        }
    }

    fn is_expired(&self, now: u64, expiration: Duration) -> bool {
        let idle = now.saturating_sub(self.last_access.load(Ordering::Relaxed));
        idle > expiration.as_nanos() as u64
    }

    fn touch(&self, now: u64) {
        self.last_access.fetch_max(now, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    renders: AtomicU64,
    discarded: AtomicU64,
    expired: AtomicU64,
    invalidated: AtomicU64,
    entry_count: AtomicU64,
}

/// Point-in-time statistics for a [`TileCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TileCacheStats {
    /// Reads that found a live entry
    pub hits: u64,
    /// Reads that found nothing (or only an expired entry)
    pub misses: u64,
    /// Misses satisfied by another caller's in-flight render
    pub coalesced: u64,
    /// Render functions invoked
    pub renders: u64,
    /// Renders not stored because their source was invalidated meanwhile
    pub discarded: u64,
    /// Entries dropped because their sliding window elapsed
    pub expired: u64,
    /// Entries dropped by source invalidation
    pub invalidated: u64,
    /// Entries currently stored
    pub entry_count: u64,
}

impl TileCacheStats {
    /// Cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl<V> TileCache<V>
where
    V: Send + Sync,
{
    /// Create an empty cache whose entries expire after `expiration` idle time.
    pub fn new(expiration: Duration) -> Self {
        Self {
            store: RwLock::new(Store {
                entries: HashMap::new(),
                generations: HashMap::new(),
                clears: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
            expiration,
            epoch: Instant::now(),
            stats: Counters::default(),
        }
    }

    /// Sliding expiration window.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Get a live tile, refreshing its expiry.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Arc<V>> {
        match self.lookup(key).await {
            Some(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Lookup without touching hit/miss counters.
    async fn lookup(&self, key: &TileCacheKey) -> Option<Arc<V>> {
        let now = self.now();
        {
            let store = self.store.read().await;
            match store.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now, self.expiration) => {
                    entry.touch(now);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Expired: upgrade and remove unless someone refreshed it meanwhile
        let mut store = self.store.write().await;
        let now = self.now();
        if let Some(entry) = store.entries.get(key) {
            if entry.is_expired(now, self.expiration) {
                store.entries.remove(key);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
                debug!(key = %key, "Tile expired");
            } else {
                entry.touch(now);
                return Some(entry.value.clone());
            }
        }
        None
    }

    /// Store a tile, replacing any existing entry for the key.
    pub async fn insert(&self, key: TileCacheKey, value: Arc<V>) {
        let entry = CachedTile::new(value, self.now());
        let mut store = self.store.write().await;
        if store.entries.insert(key, entry).is_none() {
            self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Store a tile only if its source was not invalidated since `stamp`.
    async fn insert_if_current(&self, key: &TileCacheKey, value: Arc<V>, stamp: Stamp) -> bool {
        let mut store = self.store.write().await;
        if store.stamp(&key.source_id) != stamp {
            return false;
        }
        let entry = CachedTile::new(value, self.now());
        if store.entries.insert(key.clone(), entry).is_none() {
            self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Return the cached tile for `key`, rendering and storing it on a miss.
    ///
    /// Concurrent misses on the same key run `render` once; the others wait
    /// and receive the stored value. A failed render stores nothing and the
    /// error goes to the caller that ran it; waiters then retry the render.
    /// A render that overlaps an invalidation of its source is returned but
    /// not stored.
    pub async fn get_or_render<F, Fut, E>(&self, key: &TileCacheKey, render: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let flight = self.join_flight(key);
        let _gate = flight.acquire().await;

        // Another caller may have rendered while we waited for the gate
        if let Some(value) = self.lookup(key).await {
            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Tile rendered by concurrent request");
            return Ok(value);
        }

        let stamp = self.store.read().await.stamp(&key.source_id);

        self.stats.renders.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Rendering tile on cache miss");
        let value = Arc::new(render().await?);

        if !self.insert_if_current(key, value.clone(), stamp).await {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Source invalidated during render, tile not cached");
        }
        Ok(value)
    }

    fn join_flight(&self, key: &TileCacheKey) -> InFlight<'_> {
        let mut registry = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let gate = match registry.get(key).and_then(Weak::upgrade) {
            Some(gate) => gate,
            None => {
                let gate = Arc::new(AsyncMutex::new(()));
                registry.insert(key.clone(), Arc::downgrade(&gate));
                gate
            }
        };

        InFlight {
            registry: &self.in_flight,
            key: key.clone(),
            gate: Some(gate),
        }
    }

    /// Remove every entry of `source_id`. Returns the number removed.
    ///
    /// Renders of the source already in progress will not store their tiles.
    pub async fn invalidate_source(&self, source_id: &str) -> usize {
        let mut store = self.store.write().await;
        *store.generations.entry(source_id.to_string()).or_insert(0) += 1;

        let before = store.entries.len();
        store.entries.retain(|key, _| !key.belongs_to(source_id));
        let removed = before - store.entries.len();

        self.stats
            .entry_count
            .fetch_sub(removed as u64, Ordering::Relaxed);
        self.stats
            .invalidated
            .fetch_add(removed as u64, Ordering::Relaxed);

        info!(
            source_id = source_id,
            evicted = removed,
            remaining = store.entries.len(),
            "Invalidated cached tiles for source"
        );

        removed
    }

    /// Eagerly drop all expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let now = self.now();
        let before = store.entries.len();
        store
            .entries
            .retain(|_, entry| !entry.is_expired(now, self.expiration));
        let removed = before - store.entries.len();

        if removed > 0 {
            self.stats
                .entry_count
                .fetch_sub(removed as u64, Ordering::Relaxed);
            self.stats
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!(expired = removed, "Purged expired tiles");
        }

        removed
    }

    /// Drop every entry. Statistics other than the entry count are kept.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        store.entries.clear();
        store.clears += 1;
        self.stats.entry_count.store(0, Ordering::Relaxed);
    }

    /// Current number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.stats.entry_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get current statistics.
    pub fn stats(&self) -> TileCacheStats {
        TileCacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            renders: self.stats.renders.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            expired: self.stats.expired.load(Ordering::Relaxed),
            invalidated: self.stats.invalidated.load(Ordering::Relaxed),
            entry_count: self.stats.entry_count.load(Ordering::Relaxed),
        }
    }
}

/// One caller's handle on a per-key render gate.
///
/// The registry only holds weak references. Whichever handle drops last,
/// whether it held the gate or was cancelled while waiting, removes the
/// registry entry.
struct InFlight<'a> {
    registry: &'a GateRegistry,
    key: TileCacheKey,
    gate: Option<Arc<AsyncMutex<()>>>,
}

impl InFlight<'_> {
    /// Wait for exclusive use of the gate.
    async fn acquire(&self) -> Option<AsyncMutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // Release our reference under the registry lock so the liveness check
        // below cannot race with another handle dropping
        drop(self.gate.take());

        let dead = registry
            .get(&self.key)
            .map_or(false, |gate| gate.strong_count() == 0);
        if dead {
            registry.remove(&self.key);
        }
    }
}
