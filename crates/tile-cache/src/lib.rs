//! In-memory caching of rendered map tiles.
//!
//! Provides:
//! - [`TileCacheKey`]: deterministic identity of one rendered tile
//! - [`TileCache`]: sliding-expiration store with single-flight rendering
//! - [`SourceModificationTracker`]: evicts a source's tiles when its data changes

pub mod key;
pub mod memory;
pub mod tracker;

pub use key::TileCacheKey;
pub use memory::{TileCache, TileCacheStats};
pub use tracker::{ModificationCheck, SourceModificationTracker};
