//! Common types shared across the map tile cache crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod tile;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use error::{MapError, MapResult};
pub use tile::Tile;
pub use time::TimeRange;
