//! Bitmap assembly for tiled map requests.
//!
//! ```text
//! tiles (same level) ──► stitch() ──► mosaic + union bbox ──► compose_map() ──► output
//! ```
//!
//! All bitmaps are `image::RgbaImage`; inputs are never mutated.

pub mod compose;
pub mod stitch;

use image::RgbaImage;
use map_common::Tile;

pub use compose::{blank_map, compose_map};
pub use stitch::{stitch, union_bbox};

/// A rendered tile: grid position plus its bitmap.
#[derive(Debug, Clone)]
pub struct TileImage {
    pub tile: Tile,
    pub image: RgbaImage,
}

impl TileImage {
    pub fn new(tile: Tile, image: RgbaImage) -> Self {
        Self { tile, image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
