//! A single cell of a zoom level's tile grid.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// One tile of a regular grid at some zoom level.
///
/// Row indices grow with increasing Y and column indices with increasing X,
/// so row 0 is the southernmost band of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub bbox: BoundingBox,
    pub row: u32,
    pub col: u32,
}

impl Tile {
    pub fn new(bbox: BoundingBox, row: u32, col: u32) -> Self {
        Self { bbox, row, col }
    }

    /// Pixel height that keeps this tile's aspect ratio at `pixel_width`.
    ///
    /// Never returns less than one pixel.
    pub fn pixel_height_for(&self, pixel_width: u32) -> u32 {
        let ratio = self.bbox.height() / self.bbox.width();
        ((pixel_width as f64 * ratio).round() as u32).max(1)
    }
}
